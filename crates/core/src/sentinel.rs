//! Reversible newline escaping for line-oriented transports.
//!
//! Server-sent events cannot carry a raw `\n` inside one data line, so text
//! increments are encoded before they go out and decoded by the consumer.
//! A newline becomes the two-character sentinel `\n`, a carriage return
//! becomes `\r`, and the backslash itself is doubled so that text which
//! already contains something that looks like a sentinel survives intact.

/// The token substituted for a newline on the wire.
pub const NEWLINE_SENTINEL: &str = "\\n";

const ESCAPE: char = '\\';

/// Encode text for a transport that cannot carry raw line breaks.
pub fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str(NEWLINE_SENTINEL),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`encode`].
///
/// Unknown escapes and a trailing lone backslash are kept verbatim, so
/// decoding text that was never encoded does not lose characters.
pub fn decode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != ESCAPE {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push(ESCAPE);
                out.push(other);
            }
            None => out.push(ESCAPE),
        }
    }
    out
}
