//! Mailbox state types.

/// Decoded STATUS response attributes.
///
/// Every STATUS item is optional on the wire. An absent item is `None`, never
/// zero, so callers only apply what the server actually reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// `MESSAGES`: number of messages in the mailbox.
    pub messages: Option<u32>,
    /// `RECENT`: number of messages with the `\Recent` flag.
    pub recent: Option<u32>,
    /// `UNSEEN`: number of messages without the `\Seen` flag.
    pub unseen: Option<u32>,
    /// `UIDNEXT`: next UID to be assigned.
    pub uid_next: Option<u32>,
    /// `UIDVALIDITY`: the mailbox UID validity value.
    pub uid_validity: Option<u32>,
}

impl MailboxStatus {
    /// Returns true if no attribute was present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.messages.is_none()
            && self.recent.is_none()
            && self.unseen.is_none()
            && self.uid_next.is_none()
            && self.uid_validity.is_none()
    }
}

/// Counters the host keeps for one mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxCounts {
    /// Total messages.
    pub total: u32,
    /// Unread messages.
    pub unread: u32,
    /// Messages that arrived since the host last looked.
    pub new: u32,
    /// Highest UID known to exist (`UIDNEXT - 1`).
    pub last_seen_uid: Option<u32>,
}

/// Sender and subject of a newly arrived message.
///
/// Both headers arrive on separate lines of a FETCH literal, so either may be
/// missing while the literal is still streaming in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSummary {
    /// Decoded `Subject` header value.
    pub subject: Option<String>,
    /// Decoded `From` header value.
    pub from: Option<String>,
}

impl MessageSummary {
    /// Creates an empty summary.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subject: None,
            from: None,
        }
    }

    /// Creates a complete summary.
    #[must_use]
    pub fn with(subject: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            from: Some(from.into()),
        }
    }

    /// Returns true once both headers have arrived.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.subject.is_some() && self.from.is_some()
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
    fn status_default_is_empty() {
        let status = MailboxStatus::default();
        assert!(status.is_empty());
        assert!(status.messages.is_none());
        assert!(status.uid_next.is_none());
    }

    #[test]
    fn status_zero_is_not_absent() {
        let status = MailboxStatus {
            unseen: Some(0),
            ..MailboxStatus::default()
        };
        assert!(!status.is_empty());
        assert_eq!(status.unseen, Some(0));
    }

    #[test]
    fn summary_completion() {
        let mut summary = MessageSummary::new();
        assert!(!summary.is_complete());

        summary.from = Some("alice@example.com".to_string());
        assert!(!summary.is_complete());

        summary.subject = Some("Lunch".to_string());
        assert!(summary.is_complete());
        assert_eq!(summary, MessageSummary::with("Lunch", "alice@example.com"));
    }
}
