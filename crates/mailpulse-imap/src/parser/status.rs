//! STATUS response decoding.
//!
//! A NOTIFY STATUS line looks like `* STATUS "INBOX.Lists" (MESSAGES 4 UIDNEXT 11)`.
//! The mailbox name is decoded first, then the attribute list that follows it.
//! Unknown attributes stop the scan but keep what was already decoded.

use std::borrow::Cow;

use crate::types::MailboxStatus;
use crate::{Error, Result};

/// Outcome of decoding a STATUS attribute list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStatus {
    /// Attributes decoded before the scan ended.
    pub status: MailboxStatus,
    /// Remainder of the list where an unrecognized item stopped the scan.
    pub malformed: Option<String>,
}

impl DecodedStatus {
    /// Returns true if the whole list was understood.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.malformed.is_none()
    }
}

/// Splits a mailbox name off the front of `input`.
///
/// Quoted names have their quoting and backslash escapes removed; atoms end at
/// the first space. Returns the decoded name and the text after it.
pub fn decode_mailbox_name(input: &str) -> Result<(Cow<'_, str>, &str)> {
    let Some(quoted) = input.strip_prefix('"') else {
        return Ok(match input.split_once(' ') {
            Some((atom, rest)) => (Cow::Borrowed(atom), rest),
            None => (Cow::Borrowed(input), ""),
        });
    };

    let mut escaped = false;
    let mut has_escapes = false;
    for (i, c) in quoted.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                has_escapes = true;
            }
            '"' => {
                let raw = &quoted[..i];
                let rest = quoted[i + 1..].trim_start_matches(' ');
                let name = if has_escapes {
                    Cow::Owned(unescape(raw))
                } else {
                    Cow::Borrowed(raw)
                };
                return Ok((name, rest));
            }
            _ => {}
        }
    }

    Err(Error::Parse {
        position: input.len(),
        message: "Unterminated quoted mailbox name".to_string(),
    })
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Translates a server mailbox name into the host's `/`-separated path.
#[must_use]
pub fn host_path(mailbox: &str, delimiter: char) -> String {
    if delimiter == '/' {
        return mailbox.to_string();
    }
    mailbox.replace(delimiter, "/")
}

/// Finds the byte offset of the last `(` that is not inside a quoted string.
#[must_use]
pub fn find_attribute_list(input: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;
    let mut found = None;

    for (i, b) in input.bytes().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_quote => escaped = true,
            b'"' => in_quote = !in_quote,
            b'(' if !in_quote => found = Some(i),
            _ => {}
        }
    }

    found
}

/// Decodes a STATUS attribute list such as `(MESSAGES 4 UIDNEXT 11 UNSEEN 2)`.
///
/// Recognized items are `MESSAGES`, `RECENT`, `UIDNEXT`, `UIDVALIDITY`, and
/// `UNSEEN`. Anything else ends the scan with a warning; items decoded before
/// it are kept.
///
/// # Errors
///
/// Returns [`Error::Parse`] if no attribute list can be located at all.
pub fn parse_status_att_list(input: &str) -> Result<DecodedStatus> {
    let open = find_attribute_list(input).ok_or_else(|| Error::Parse {
        position: 0,
        message: "STATUS response has no attribute list".to_string(),
    })?;

    let mut status = MailboxStatus::default();
    let mut rest = &input[open + 1..];

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() || rest.starts_with(')') {
            return Ok(DecodedStatus {
                status,
                malformed: None,
            });
        }

        let Some((name, value, remaining)) = split_item(rest) else {
            return Ok(malformed(status, rest));
        };

        let slot = if name.eq_ignore_ascii_case("MESSAGES") {
            &mut status.messages
        } else if name.eq_ignore_ascii_case("RECENT") {
            &mut status.recent
        } else if name.eq_ignore_ascii_case("UIDNEXT") {
            &mut status.uid_next
        } else if name.eq_ignore_ascii_case("UIDVALIDITY") {
            &mut status.uid_validity
        } else if name.eq_ignore_ascii_case("UNSEEN") {
            &mut status.unseen
        } else {
            return Ok(malformed(status, rest));
        };

        *slot = Some(value);
        rest = remaining;
    }
}

/// Splits `KEYWORD <number>` off the front of `input`.
fn split_item(input: &str) -> Option<(&str, u32, &str)> {
    let (name, after) = input.split_once(' ')?;
    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let value = after[..digits].parse().ok()?;
    Some((name, value, &after[digits..]))
}

fn malformed(status: MailboxStatus, rest: &str) -> DecodedStatus {
    tracing::warn!(remainder = rest, "invalid STATUS response");
    DecodedStatus {
        status,
        malformed: Some(rest.to_string()),
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
    use proptest::prelude::*;

    #[test]
    fn test_full_list() {
        let decoded =
            parse_status_att_list("(MESSAGES 4 RECENT 1 UIDNEXT 11 UIDVALIDITY 1700 UNSEEN 2)")
                .unwrap();
        assert!(decoded.is_complete());
        assert_eq!(
            decoded.status,
            MailboxStatus {
                messages: Some(4),
                recent: Some(1),
                unseen: Some(2),
                uid_next: Some(11),
                uid_validity: Some(1700),
            }
        );
    }

    #[test]
    fn test_subset_leaves_others_absent() {
        let decoded = parse_status_att_list("(UIDNEXT 11 UNSEEN 0)").unwrap();
        assert_eq!(decoded.status.uid_next, Some(11));
        assert_eq!(decoded.status.unseen, Some(0));
        assert_eq!(decoded.status.messages, None);
        assert_eq!(decoded.status.recent, None);
        assert_eq!(decoded.status.uid_validity, None);
    }

    #[test]
    fn test_empty_list() {
        let decoded = parse_status_att_list("()").unwrap();
        assert!(decoded.is_complete());
        assert!(decoded.status.is_empty());
    }

    #[test]
    fn test_unknown_keyword_keeps_prefix() {
        let decoded = parse_status_att_list("(MESSAGES 4 HIGHESTMODSEQ 99 UNSEEN 2)").unwrap();
        assert_eq!(decoded.status.messages, Some(4));
        assert_eq!(decoded.status.unseen, None);
        assert_eq!(decoded.malformed.as_deref(), Some("HIGHESTMODSEQ 99 UNSEEN 2)"));
    }

    #[test]
    fn test_missing_value_is_malformed() {
        let decoded = parse_status_att_list("(MESSAGES x)").unwrap();
        assert!(decoded.status.is_empty());
        assert!(!decoded.is_complete());
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let decoded = parse_status_att_list("(messages 3 Unseen 1)").unwrap();
        assert_eq!(decoded.status.messages, Some(3));
        assert_eq!(decoded.status.unseen, Some(1));
    }

    #[test]
    fn test_no_list_is_an_error() {
        assert!(parse_status_att_list("MESSAGES 4").is_err());
        assert!(parse_status_att_list("").is_err());
    }

    #[test]
    fn test_paren_inside_quoted_name_is_skipped() {
        let input = "\"Odd (name\" (MESSAGES 7)";
        let open = find_attribute_list(input).unwrap();
        assert_eq!(&input[open..], "(MESSAGES 7)");

        let decoded = parse_status_att_list(input).unwrap();
        assert_eq!(decoded.status.messages, Some(7));
    }

    #[test]
    fn test_decode_atom_name() {
        let (name, rest) = decode_mailbox_name("INBOX.Sub.Folder (MESSAGES 1)").unwrap();
        assert_eq!(name, "INBOX.Sub.Folder");
        assert_eq!(rest, "(MESSAGES 1)");
    }

    #[test]
    fn test_decode_quoted_name() {
        let (name, rest) = decode_mailbox_name("\"My Mail\" (UNSEEN 1)").unwrap();
        assert!(matches!(name, Cow::Borrowed("My Mail")));
        assert_eq!(rest, "(UNSEEN 1)");
    }

    #[test]
    fn test_decode_quoted_name_with_escapes() {
        let (name, rest) = decode_mailbox_name(r#""A.b\"c" (MESSAGES 2)"#).unwrap();
        assert_eq!(name, "A.b\"c");
        assert_eq!(rest, "(MESSAGES 2)");
        assert_eq!(host_path(&name, '.'), "A/b\"c");
    }

    #[test]
    fn test_decode_unterminated_quote() {
        assert!(decode_mailbox_name("\"INBOX (MESSAGES 1)").is_err());
    }

    #[test]
    fn test_host_path() {
        assert_eq!(host_path("INBOX.Sub.Folder", '.'), "INBOX/Sub/Folder");
        assert_eq!(host_path("INBOX/Sub", '/'), "INBOX/Sub");
        assert_eq!(host_path("INBOX", '.'), "INBOX");
    }

    fn attribute_subset() -> impl Strategy<Value = Vec<(&'static str, u32)>> {
        let names = ["MESSAGES", "RECENT", "UIDNEXT", "UIDVALIDITY", "UNSEEN"];
        proptest::collection::vec(any::<u32>(), 5).prop_flat_map(move |values| {
            let pairs = names.iter().copied().zip(values).collect::<Vec<_>>();
            proptest::sample::subsequence(pairs, 0..=5)
        })
    }

    fn expected(items: &[(&str, u32)], name: &str) -> Option<u32> {
        items.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    proptest! {
        #[test]
        fn prop_present_items_only(items in attribute_subset()) {
            let body: Vec<String> = items.iter().map(|(n, v)| format!("{n} {v}")).collect();
            let input = format!("(\"INBOX\" ({}))", body.join(" "));
            let decoded = parse_status_att_list(&input).unwrap();

            prop_assert!(decoded.is_complete());
            prop_assert_eq!(decoded.status.messages, expected(&items, "MESSAGES"));
            prop_assert_eq!(decoded.status.recent, expected(&items, "RECENT"));
            prop_assert_eq!(decoded.status.uid_next, expected(&items, "UIDNEXT"));
            prop_assert_eq!(decoded.status.uid_validity, expected(&items, "UIDVALIDITY"));
            prop_assert_eq!(decoded.status.unseen, expected(&items, "UNSEEN"));
        }

        #[test]
        fn prop_unknown_keyword_keeps_first_n(
            items in attribute_subset(),
            trailing in attribute_subset(),
        ) {
            let mut body: Vec<String> = items.iter().map(|(n, v)| format!("{n} {v}")).collect();
            body.push("XBOGUS 1".to_string());
            body.extend(trailing.iter().map(|(n, v)| format!("{n} {v}")));
            let input = format!("({})", body.join(" "));
            let decoded = parse_status_att_list(&input).unwrap();

            prop_assert!(!decoded.is_complete());
            prop_assert_eq!(decoded.status.messages, expected(&items, "MESSAGES"));
            prop_assert_eq!(decoded.status.recent, expected(&items, "RECENT"));
            prop_assert_eq!(decoded.status.uid_next, expected(&items, "UIDNEXT"));
            prop_assert_eq!(decoded.status.uid_validity, expected(&items, "UIDVALIDITY"));
            prop_assert_eq!(decoded.status.unseen, expected(&items, "UNSEEN"));
        }
    }
}
