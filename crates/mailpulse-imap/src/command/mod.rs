//! IMAP commands issued by the monitor and by the connection collaborator.
//!
//! Commands are rendered as a single line without the CRLF terminator; the
//! transport appends it when writing.

mod serialize;
mod tag_generator;

pub use tag_generator::{CommandTag, TagCycle};

use serialize::write_astring;

/// NOTIFY SET request that also pushes From/Subject of new INBOX mail.
const NOTIFY_WITH_SUMMARIES: &str = "NOTIFY SET \
    (selected (MessageExpunge MessageNew (uid body.peek[header.fields (from subject)]))) \
    (inboxes (MessageNew))";

/// NOTIFY SET request for new-message events only.
const NOTIFY_NEW_ONLY: &str = "NOTIFY SET (inboxes (MessageNew))";

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// NOOP command.
    Noop,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// CLOSE command.
    Close,
    /// NOTIFY SET command (RFC 5465).
    NotifySet {
        /// Ask the server to include From/Subject of new selected-mailbox
        /// messages inline.
        summaries: bool,
    },
    /// IDLE command (RFC 2177).
    Idle,
    /// DONE continuation ending IDLE (untagged).
    Done,
}

impl Command {
    /// `SELECT INBOX`.
    #[must_use]
    pub fn select_inbox() -> Self {
        Self::Select {
            mailbox: "INBOX".to_string(),
        }
    }

    /// Serializes the command with the given tag.
    ///
    /// `DONE` is not tagged; the tag is ignored for it.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> String {
        let mut buf = String::new();
        if !matches!(self, Self::Done) {
            buf.push_str(tag);
            buf.push(' ');
        }

        match self {
            Self::Noop => buf.push_str("NOOP"),
            Self::StartTls => buf.push_str("STARTTLS"),
            Self::Login { username, password } => {
                buf.push_str("LOGIN ");
                write_astring(&mut buf, username);
                buf.push(' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.push_str("SELECT ");
                write_astring(&mut buf, mailbox);
            }
            Self::Close => buf.push_str("CLOSE"),
            Self::NotifySet { summaries: true } => buf.push_str(NOTIFY_WITH_SUMMARIES),
            Self::NotifySet { summaries: false } => buf.push_str(NOTIFY_NEW_ONLY),
            Self::Idle => buf.push_str("IDLE"),
            Self::Done => buf.push_str("DONE"),
        }

        buf
    }

    /// Returns true if the command carries credentials that must not be logged.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Login { .. })
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
    fn test_simple_commands() {
        assert_eq!(Command::Noop.serialize("N0003"), "N0003 NOOP");
        assert_eq!(Command::Close.serialize("N0001"), "N0001 CLOSE");
        assert_eq!(Command::Idle.serialize("N0005"), "N0005 IDLE");
    }

    #[test]
    fn test_done_is_untagged() {
        assert_eq!(Command::Done.serialize("N0005"), "DONE");
    }

    #[test]
    fn test_select_inbox() {
        assert_eq!(
            Command::select_inbox().serialize("N0001"),
            "N0001 SELECT INBOX"
        );
    }

    #[test]
    fn test_notify_with_summaries() {
        assert_eq!(
            Command::NotifySet { summaries: true }.serialize("N0002"),
            "N0002 NOTIFY SET (selected (MessageExpunge MessageNew \
             (uid body.peek[header.fields (from subject)]))) (inboxes (MessageNew))"
        );
    }

    #[test]
    fn test_notify_new_only() {
        assert_eq!(
            Command::NotifySet { summaries: false }.serialize("N0002"),
            "N0002 NOTIFY SET (inboxes (MessageNew))"
        );
    }

    #[test]
    fn test_login_quotes_credentials() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "secret pass".to_string(),
        };
        assert!(cmd.is_sensitive());
        assert_eq!(
            cmd.serialize("L1"),
            "L1 LOGIN user@example.com \"secret pass\""
        );
    }
}
