//! Line classification for the monitor connection.
//!
//! The monitor reads the connection one line at a time, so a FETCH literal's
//! header lines arrive as bare `From: ...` / `Subject: ...` lines between the
//! `* n FETCH (... {len}` opener and a lone `)`. Each line is sliced into a
//! borrowed [`ResponseLine`] without modifying the input.

use std::borrow::Cow;

use crate::Result;
use crate::command::{CommandTag, TagCycle};

use super::status::decode_mailbox_name;

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error, or unknown command).
    Bad,
}

/// Event carried by an untagged `* <n> <event>` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericEvent<'a> {
    /// Message count of the selected mailbox.
    Exists,
    /// Recent count of the selected mailbox.
    Recent,
    /// A message was expunged.
    Expunge,
    /// FETCH response whose header data follows as a literal.
    FetchLiteral,
    /// FETCH response without a literal (flags and the like).
    Fetch,
    /// Anything else.
    Other(&'a str),
}

/// Header field carried inside a FETCH literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    /// `From:`
    From,
    /// `Subject:`
    Subject,
}

/// One classified line from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseLine<'a> {
    /// Completion of one of our commands.
    Tagged {
        /// Role the tag belongs to.
        tag: CommandTag,
        /// Completion status.
        completion: Completion,
        /// Human-readable text after the status.
        text: &'a str,
    },
    /// Continuation request (`+ ...`).
    Continuation(&'a str),
    /// `* <n> EXISTS|RECENT|EXPUNGE|FETCH`.
    Numeric {
        /// The number before the event name.
        number: u32,
        /// The event.
        event: NumericEvent<'a>,
    },
    /// `* STATUS <mailbox> (<attributes>)`.
    Status {
        /// Decoded mailbox name, still using the server hierarchy delimiter.
        mailbox: Cow<'a, str>,
        /// Text after the mailbox name, normally the attribute list.
        attributes: &'a str,
    },
    /// `* BYE ...`.
    Bye(&'a str),
    /// Header line inside a FETCH literal.
    Header {
        /// Which header.
        field: HeaderField,
        /// Raw value, leading whitespace removed.
        value: &'a str,
    },
    /// Folded continuation of the previous header line, leading whitespace
    /// included.
    HeaderContinuation(&'a str),
    /// A lone `)` closing a FETCH literal.
    LiteralEnd,
    /// Anything else, including completions with unknown tags.
    Unclassified,
}

/// Classifies one line (with or without its CRLF terminator).
///
/// # Errors
///
/// Returns a parse error only for STATUS lines whose mailbox name cannot be
/// decoded. Every other line classifies, falling back to
/// [`ResponseLine::Unclassified`].
pub fn classify<'a>(line: &'a str, tags: &TagCycle) -> Result<ResponseLine<'a>> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.starts_with([' ', '\t']) && !line.trim().is_empty() {
        return Ok(ResponseLine::HeaderContinuation(line));
    }

    if line.trim_end() == ")" {
        return Ok(ResponseLine::LiteralEnd);
    }

    if let Some(value) = strip_prefix_ignore_case(line, "From:") {
        return Ok(ResponseLine::Header {
            field: HeaderField::From,
            value: value.trim_start(),
        });
    }
    if let Some(value) = strip_prefix_ignore_case(line, "Subject:") {
        return Ok(ResponseLine::Header {
            field: HeaderField::Subject,
            value: value.trim_start(),
        });
    }

    if line == "+" {
        return Ok(ResponseLine::Continuation(""));
    }
    if let Some(text) = line.strip_prefix("+ ") {
        return Ok(ResponseLine::Continuation(text));
    }

    if let Some(untagged) = line.strip_prefix("* ") {
        return classify_untagged(untagged);
    }

    Ok(classify_tagged(line, tags))
}

fn classify_untagged(line: &str) -> Result<ResponseLine<'_>> {
    if let Some(rest) = strip_prefix_ignore_case(line, "STATUS ") {
        let (mailbox, attributes) = decode_mailbox_name(rest)?;
        return Ok(ResponseLine::Status {
            mailbox,
            attributes,
        });
    }

    if let Some(rest) = strip_prefix_ignore_case(line, "BYE")
        && (rest.is_empty() || rest.starts_with(' '))
    {
        return Ok(ResponseLine::Bye(rest.trim_start()));
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok(ResponseLine::Unclassified);
    }
    let Ok(number) = line[..digits].parse::<u32>() else {
        return Ok(ResponseLine::Unclassified);
    };
    let Some(rest) = line[digits..].strip_prefix(' ') else {
        return Ok(ResponseLine::Unclassified);
    };

    let event = if rest.eq_ignore_ascii_case("EXISTS") {
        NumericEvent::Exists
    } else if rest.eq_ignore_ascii_case("RECENT") {
        NumericEvent::Recent
    } else if rest.eq_ignore_ascii_case("EXPUNGE") {
        NumericEvent::Expunge
    } else if let Some(items) = strip_prefix_ignore_case(rest, "FETCH ") {
        if items.contains('{') {
            NumericEvent::FetchLiteral
        } else {
            NumericEvent::Fetch
        }
    } else {
        NumericEvent::Other(rest)
    };

    Ok(ResponseLine::Numeric { number, event })
}

fn classify_tagged<'a>(line: &'a str, tags: &TagCycle) -> ResponseLine<'a> {
    let Some((tag, rest)) = line.split_once(' ') else {
        return ResponseLine::Unclassified;
    };
    let Some(tag) = tags.parse(tag) else {
        return ResponseLine::Unclassified;
    };

    let (status, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let completion = if status.eq_ignore_ascii_case("OK") {
        Completion::Ok
    } else if status.eq_ignore_ascii_case("NO") {
        Completion::No
    } else if status.eq_ignore_ascii_case("BAD") {
        Completion::Bad
    } else {
        return ResponseLine::Unclassified;
    };

    ResponseLine::Tagged {
        tag,
        completion,
        text,
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
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

    fn parse(line: &str) -> ResponseLine<'_> {
        classify(line, &TagCycle::default()).unwrap()
    }

    #[test]
    fn test_tagged_ok() {
        assert_eq!(
            parse("N0002 OK NOTIFY completed\r\n"),
            ResponseLine::Tagged {
                tag: CommandTag::Notify,
                completion: Completion::Ok,
                text: "NOTIFY completed",
            }
        );
    }

    #[test]
    fn test_tagged_bad_and_no() {
        assert!(matches!(
            parse("N0002 BAD Unknown command"),
            ResponseLine::Tagged {
                tag: CommandTag::Notify,
                completion: Completion::Bad,
                ..
            }
        ));
        assert!(matches!(
            parse("N0005 NO IDLE not allowed"),
            ResponseLine::Tagged {
                tag: CommandTag::Idle,
                completion: Completion::No,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_tag_unclassified() {
        assert_eq!(parse("A0001 OK done"), ResponseLine::Unclassified);
        assert_eq!(parse("N0009 OK done"), ResponseLine::Unclassified);
        assert_eq!(parse("N0001 PREAUTH hi"), ResponseLine::Unclassified);
    }

    #[test]
    fn test_continuation() {
        assert_eq!(parse("+ idling"), ResponseLine::Continuation("idling"));
        assert_eq!(parse("+"), ResponseLine::Continuation(""));
    }

    #[test]
    fn test_numeric_events() {
        assert_eq!(
            parse("* 23 EXISTS"),
            ResponseLine::Numeric {
                number: 23,
                event: NumericEvent::Exists
            }
        );
        assert_eq!(
            parse("* 2 RECENT"),
            ResponseLine::Numeric {
                number: 2,
                event: NumericEvent::Recent
            }
        );
        assert_eq!(
            parse("* 7 EXPUNGE"),
            ResponseLine::Numeric {
                number: 7,
                event: NumericEvent::Expunge
            }
        );
    }

    #[test]
    fn test_fetch_with_literal() {
        assert_eq!(
            parse("* 24 FETCH (UID 118 BODY[HEADER.FIELDS (FROM SUBJECT)] {72}"),
            ResponseLine::Numeric {
                number: 24,
                event: NumericEvent::FetchLiteral
            }
        );
        assert_eq!(
            parse("* 24 FETCH (FLAGS (\\Seen))"),
            ResponseLine::Numeric {
                number: 24,
                event: NumericEvent::Fetch
            }
        );
    }

    #[test]
    fn test_numeric_other() {
        assert_eq!(
            parse("* 3 VANISHED"),
            ResponseLine::Numeric {
                number: 3,
                event: NumericEvent::Other("VANISHED")
            }
        );
    }

    #[test]
    fn test_status_line() {
        match parse("* STATUS \"INBOX.Sub\" (MESSAGES 4 UNSEEN 1)") {
            ResponseLine::Status {
                mailbox,
                attributes,
            } => {
                assert_eq!(mailbox, "INBOX.Sub");
                assert_eq!(attributes, "(MESSAGES 4 UNSEEN 1)");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_atom_mailbox() {
        match parse("* STATUS Lists.rust (UIDNEXT 9)") {
            ResponseLine::Status { mailbox, .. } => assert_eq!(mailbox, "Lists.rust"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_bad_mailbox_is_error() {
        assert!(classify("* STATUS \"INBOX (MESSAGES 1)", &TagCycle::default()).is_err());
    }

    #[test]
    fn test_bye() {
        assert_eq!(
            parse("* BYE Autologout; idle for too long"),
            ResponseLine::Bye("Autologout; idle for too long")
        );
        assert_eq!(parse("* BYE"), ResponseLine::Bye(""));
        assert_eq!(parse("* BYEBYE"), ResponseLine::Unclassified);
    }

    #[test]
    fn test_header_lines() {
        assert_eq!(
            parse("From: Alice <alice@example.com>"),
            ResponseLine::Header {
                field: HeaderField::From,
                value: "Alice <alice@example.com>",
            }
        );
        assert_eq!(
            parse("Subject: Quarterly numbers\r\n"),
            ResponseLine::Header {
                field: HeaderField::Subject,
                value: "Quarterly numbers",
            }
        );
        assert_eq!(
            parse("SUBJECT: shouting"),
            ResponseLine::Header {
                field: HeaderField::Subject,
                value: "shouting",
            }
        );
    }

    #[test]
    fn test_folded_header_line() {
        assert_eq!(
            parse(" =?UTF-8?Q?_and_the_board?=\r\n"),
            ResponseLine::HeaderContinuation(" =?UTF-8?Q?_and_the_board?=")
        );
        assert_eq!(parse("\tmore"), ResponseLine::HeaderContinuation("\tmore"));
        assert_eq!(parse("   "), ResponseLine::Unclassified);
    }

    #[test]
    fn test_literal_end() {
        assert_eq!(parse(")"), ResponseLine::LiteralEnd);
        assert_eq!(parse(")\r\n"), ResponseLine::LiteralEnd);
    }

    #[test]
    fn test_unclassified() {
        assert_eq!(parse(""), ResponseLine::Unclassified);
        assert_eq!(parse("* OK still here"), ResponseLine::Unclassified);
        assert_eq!(parse("To: bob@example.com"), ResponseLine::Unclassified);
    }
}
