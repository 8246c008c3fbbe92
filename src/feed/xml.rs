//! Generic XML tree, the first stage of feed parsing.
//!
//! The tree mirrors how RSS is usually consumed: an element holding only text
//! becomes [`XmlValue::Text`], an element with child elements becomes
//! [`XmlValue::Node`]. Siblings sharing a name are grouped, and because a
//! feed with one `<item>` looks different from a feed with many, each group is
//! the tagged variant [`Field::One`] or [`Field::Many`]. Callers that expect a
//! list use [`Field::as_sequence`] and never see the difference.
//!
//! Attributes, comments, processing instructions and the doctype are dropped.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting accepted before the document is rejected.
/// Real feeds nest a handful of levels; this bounds memory on hostile input.
pub const MAX_XML_DEPTH: usize = 64;

/// Errors that make a payload unusable as XML.
#[derive(Debug, Error)]
pub enum XmlError {
    /// quick-xml rejected the input (bad syntax, mismatched end tag, ...)
    #[error("XML parse error: {0}")]
    Syntax(String),

    /// Nesting depth exceeds [`MAX_XML_DEPTH`].
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The document ended while an element was still open.
    #[error("unclosed element <{0}> at end of document")]
    Unclosed(String),
}

/// Content of one element.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    /// Text-only or empty element, trimmed, with entities and CDATA decoded.
    Text(String),
    /// Element with at least one child element. Its own text is discarded.
    Node(XmlNode),
}

impl XmlValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(text) => Some(text),
            XmlValue::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&XmlNode> {
        match self {
            XmlValue::Node(node) => Some(node),
            XmlValue::Text(_) => None,
        }
    }
}

/// All children of one element that share a name.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    One(XmlValue),
    Many(Vec<XmlValue>),
}

impl Field {
    /// Normalize to a slice: a single occurrence is a one-element sequence.
    pub fn as_sequence(&self) -> &[XmlValue] {
        match self {
            Field::One(value) => std::slice::from_ref(value),
            Field::Many(values) => values,
        }
    }

    /// The value when the name occurred exactly once.
    pub fn as_single(&self) -> Option<&XmlValue> {
        match self {
            Field::One(value) => Some(value),
            Field::Many(_) => None,
        }
    }

    fn push(&mut self, value: XmlValue) {
        let previous = std::mem::replace(self, Field::Many(Vec::new()));
        *self = match previous {
            Field::One(first) => Field::Many(vec![first, value]),
            Field::Many(mut values) => {
                values.push(value);
                Field::Many(values)
            }
        };
    }
}

/// Child elements of one element (or of the document), grouped by name in
/// order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    children: Vec<(String, Field)>,
}

impl XmlNode {
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, field)| field)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn push(&mut self, name: String, value: XmlValue) {
        match self.children.iter_mut().find(|(child, _)| *child == name) {
            Some((_, field)) => field.push(value),
            None => self.children.push((name, Field::One(value))),
        }
    }
}

/// An element that has been opened but not yet closed.
struct Frame {
    name: String,
    text: String,
    node: XmlNode,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            text: String::new(),
            node: XmlNode::default(),
        }
    }

    fn finish(self) -> (String, XmlValue) {
        let value = if self.node.is_empty() {
            XmlValue::Text(self.text.trim().to_owned())
        } else {
            XmlValue::Node(self.node)
        };
        (self.name, value)
    }
}

fn innermost<'a>(root: &'a mut XmlNode, stack: &'a mut [Frame]) -> &'a mut XmlNode {
    match stack.last_mut() {
        Some(frame) => &mut frame.node,
        None => root,
    }
}

fn element_name(raw: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| XmlError::Syntax(format!("element name is not UTF-8: {e}")))
}

/// Decode character and entity references one at a time.
///
/// The predefined entities and numeric references are resolved by quick-xml.
/// A reference it does not know (`&nbsp;`) or a stray `&` is copied through
/// unchanged without affecting the references around it.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let reference = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .filter(|&end| tail.as_bytes()[end + 1] == b';')
            .map(|end| &tail[..end + 2]);

        match reference {
            Some(reference) => {
                match quick_xml::escape::unescape(reference) {
                    Ok(decoded) => out.push_str(&decoded),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[reference.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Parse a whole document into a tree whose top level holds the root element.
///
/// Text must be UTF-8. Entity declarations are never expanded (quick-xml does
/// not parse them). Undeclared entities such as `&nbsp;` are kept verbatim
/// rather than failing the whole document.
pub fn parse_tree(bytes: &[u8]) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_reader(bytes);

    let mut root = XmlNode::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_XML_DEPTH {
                    return Err(XmlError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                stack.push(Frame::new(element_name(e.name().as_ref())?));
            }
            Ok(Event::Empty(e)) => {
                let name = element_name(e.name().as_ref())?;
                innermost(&mut root, &mut stack).push(name, XmlValue::Text(String::new()));
            }
            Ok(Event::End(_)) => {
                // quick-xml already verified the end tag matches the open one
                let frame = stack
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unexpected closing tag".to_owned()))?;
                let (name, value) = frame.finish();
                innermost(&mut root, &mut stack).push(name, value);
            }
            Ok(Event::Text(e)) => {
                if let Some(frame) = stack.last_mut() {
                    let raw = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| XmlError::Syntax(err.to_string()))?;
                    frame.text.push_str(&unescape_lenient(&raw));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(frame) = stack.last_mut() {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| XmlError::Syntax(err.to_string()))?;
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlError::Syntax(e.to_string())),
            // Declaration, comments, processing instructions, doctype
            _ => {}
        }
        buf.clear();
    }

    match stack.pop() {
        Some(frame) => Err(XmlError::Unclosed(frame.name)),
        None => Ok(root),
    }
}
