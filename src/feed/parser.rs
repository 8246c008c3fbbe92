use thiserror::Error;

use super::xml::{parse_tree, Field, XmlError, XmlNode, XmlValue};

/// A validated RSS channel, alive for one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Valid items in the order the feed declares them
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    /// Together with the feed id, identifies a post across polls
    pub link: String,
    /// `None` when the item carries an empty `<description/>`
    pub description: Option<String>,
    /// Raw `<pubDate>` text; converted to an instant during ingestion
    pub pub_date: String,
}

/// Output of [`parse_feed`]: the document plus how many items were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub document: FeedDocument,
    pub skipped: usize,
}

/// The payload cannot be interpreted as minimal RSS. Fatal to the poll cycle.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Feed is not valid XML: {0}")]
    Xml(#[from] XmlError),

    #[error("Feed is missing <{0}>")]
    Missing(&'static str),

    /// `rss` or `channel` is text, empty, or repeated
    #[error("Feed <{0}> must be a single element")]
    NotAnElement(&'static str),

    #[error("Feed <{0}> must be a single text value")]
    NotText(&'static str),
}

/// Why a single `<item>` was dropped. Never fatal to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemDefect {
    #[error("item is not an element")]
    NotAnElement,

    #[error("item is missing <{0}>")]
    Missing(&'static str),

    #[error("item <{0}> is not a single text value")]
    NotText(&'static str),
}

/// Ways a named child can fail to be what the caller needs
enum Lookup {
    Missing,
    WrongShape,
}

fn single_text<'a>(node: &'a XmlNode, name: &str) -> Result<&'a str, Lookup> {
    let field = node.get(name).ok_or(Lookup::Missing)?;
    field
        .as_single()
        .and_then(XmlValue::as_text)
        .ok_or(Lookup::WrongShape)
}

fn single_node<'a>(node: &'a XmlNode, name: &str) -> Result<&'a XmlNode, Lookup> {
    let field = node.get(name).ok_or(Lookup::Missing)?;
    field
        .as_single()
        .and_then(XmlValue::as_node)
        .ok_or(Lookup::WrongShape)
}

fn required_element<'a>(
    node: &'a XmlNode,
    name: &'static str,
) -> Result<&'a XmlNode, ParseError> {
    single_node(node, name).map_err(|lookup| match lookup {
        Lookup::Missing => ParseError::Missing(name),
        Lookup::WrongShape => ParseError::NotAnElement(name),
    })
}

fn channel_text(channel: &XmlNode, name: &'static str) -> Result<String, ParseError> {
    single_text(channel, name)
        .map(str::to_owned)
        .map_err(|lookup| match lookup {
            Lookup::Missing => ParseError::Missing(name),
            Lookup::WrongShape => ParseError::NotText(name),
        })
}

fn item_text(item: &XmlNode, name: &'static str) -> Result<String, ItemDefect> {
    single_text(item, name)
        .map(str::to_owned)
        .map_err(|lookup| match lookup {
            Lookup::Missing => ItemDefect::Missing(name),
            Lookup::WrongShape => ItemDefect::NotText(name),
        })
}

/// Check one `<item>` candidate.
///
/// `title`, `link`, `description` and `pubDate` must each appear exactly once
/// as plain text.
pub fn validate_item(candidate: &XmlValue) -> Result<FeedItem, ItemDefect> {
    let item = candidate.as_node().ok_or(ItemDefect::NotAnElement)?;

    let title = item_text(item, "title")?;
    let link = item_text(item, "link")?;
    let description = item_text(item, "description")?;
    let pub_date = item_text(item, "pubDate")?;

    Ok(FeedItem {
        title,
        link,
        description: (!description.is_empty()).then_some(description),
        pub_date,
    })
}

/// Parse an RSS 2.0 payload.
///
/// The channel must carry `title`, `link` and `description`. `<item>` may be
/// absent, single or repeated. Items failing [`validate_item`] are dropped and
/// counted in [`ParseResult::skipped`]; one bad item never rejects the feed.
///
/// # Errors
///
/// Returns [`ParseError`] if the bytes are not well-formed XML, if
/// `rss`/`channel` is missing or not an element, or if a channel field is
/// missing or not text.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult, ParseError> {
    let tree = parse_tree(bytes)?;
    let rss = required_element(&tree, "rss")?;
    let channel = required_element(rss, "channel")?;

    let title = channel_text(channel, "title")?;
    let link = channel_text(channel, "link")?;
    let description = channel_text(channel, "description")?;

    let candidates = channel
        .get("item")
        .map(Field::as_sequence)
        .unwrap_or_default();

    let items: Vec<FeedItem> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| match validate_item(candidate) {
            Ok(item) => Some(item),
            Err(defect) => {
                tracing::debug!(index, defect = %defect, "Skipping malformed feed item");
                None
            }
        })
        .collect();
    let skipped = candidates.len() - items.len();

    Ok(ParseResult {
        document: FeedDocument {
            title,
            link,
            description,
            items,
        },
        skipped,
    })
}
