use std::borrow::Cow;

fn is_unsafe_control(c: char) -> bool {
    (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{9b}'
}

/// Remove terminal control characters and ANSI escape sequences.
///
/// Feed titles and descriptions come from arbitrary servers and are printed
/// straight to the terminal by `browse` and `feeds`. CSI (`ESC [ ... final`)
/// and OSC (`ESC ] ... BEL|ESC \`) sequences are dropped whole; any other
/// control character except tab, newline and carriage return is dropped alone.
///
/// Clean input is returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_unsafe_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter and intermediate bytes up to the final byte
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_unsafe_control(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}
