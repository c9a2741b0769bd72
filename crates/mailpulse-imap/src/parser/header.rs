//! Header value decoding for notification summaries.
//!
//! `From` and `Subject` arrive raw inside the FETCH literal and frequently
//! contain RFC 2047 encoded words (`=?charset?B|Q?text?=`).

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped. Words that cannot
/// be decoded are kept verbatim.
#[must_use]
pub fn decode_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_word(candidate) {
            if !(after_word && before.chars().all(char::is_whitespace)) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    out.push_str(rest);
    out
}

/// Decodes one encoded word at the start of `input`.
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_word(input: &str) -> Option<(String, usize)> {
    let inner = input.strip_prefix("=?")?;
    let (charset, after_charset) = inner.split_once('?')?;
    let (encoding, after_encoding) = after_charset.split_once('?')?;
    let end = after_encoding.find("?=")?;
    let text = &after_encoding[..end];
    if text.contains(char::is_whitespace) {
        return None;
    }

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    let bytes = match encoding {
        "B" | "b" => STANDARD
            .decode(text)
            .or_else(|_| STANDARD_NO_PAD.decode(text))
            .ok()?,
        "Q" | "q" => decode_q(text)?,
        _ => return None,
    };

    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    let decoded = if charset.eq_ignore_ascii_case("iso-8859-1")
        || charset.eq_ignore_ascii_case("latin1")
    {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        String::from_utf8(bytes).ok()?
    };
    Some((decoded, consumed))
}

fn decode_q(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = hex_value(bytes.next()?)?;
                let lo = hex_value(bytes.next()?)?;
                out.push((hi << 4) | lo);
            }
            _ => out.push(b),
        }
    }
    Some(out)
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_unchanged() {
        assert_eq!(decode_header_value("Weekly report"), "Weekly report");
        assert_eq!(decode_header_value(""), "");
    }

    #[test]
    fn test_base64_word() {
        assert_eq!(decode_header_value("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_q_word() {
        assert_eq!(decode_header_value("=?UTF-8?Q?H=C3=A9llo_there?="), "Héllo there");
    }

    #[test]
    fn test_latin1_word() {
        assert_eq!(decode_header_value("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_adjacent_words_join() {
        assert_eq!(
            decode_header_value("=?utf-8?Q?Hello_?= =?utf-8?Q?world?="),
            "Hello world"
        );
    }

    #[test]
    fn test_word_inside_address() {
        assert_eq!(
            decode_header_value("=?utf-8?B?SMOpbGxv?= <hello@example.com>"),
            "Héllo <hello@example.com>"
        );
    }

    #[test]
    fn test_broken_word_kept_verbatim() {
        assert_eq!(decode_header_value("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_header_value("a =? b"), "a =? b");
        assert_eq!(decode_header_value("=?utf-8?Q?bad=Z1?="), "=?utf-8?Q?bad=Z1?=");
    }
}
