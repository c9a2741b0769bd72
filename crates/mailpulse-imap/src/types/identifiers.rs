//! Identifiers for accounts, connections, and host mailboxes.
//!
//! Sessions hold these by value instead of pointing back into the host's
//! account/folder objects, so no reference cycles exist between a session and
//! the model it updates.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a host account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub String);

impl AccountId {
    /// Creates a new account identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identity of one transport connection.
///
/// Inbound lines are stamped with the id of the connection that produced them
/// so the dispatcher can drop lines that outlive their session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocates the next unused connection id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to a mailbox in the host's folder model.
///
/// The host resolves paths to references; the monitor never owns the mailbox
/// itself, it only hands the reference back through the host interface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxRef {
    /// Owning account.
    pub account: AccountId,
    /// Host path with `/` as the hierarchy separator (e.g. `INBOX/Lists`).
    pub path: String,
}

impl MailboxRef {
    /// Creates a new mailbox reference.
    #[must_use]
    pub fn new(account: AccountId, path: impl Into<String>) -> Self {
        Self {
            account,
            path: path.into(),
        }
    }
}

impl std::fmt::Display for MailboxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.path)
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
    fn account_display() {
        let account = AccountId::new("work");
        assert_eq!(account.as_str(), "work");
        assert_eq!(format!("{account}"), "work");
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn mailbox_ref_display() {
        let mailbox = MailboxRef::new(AccountId::new("home"), "INBOX/Lists");
        assert_eq!(mailbox.to_string(), "home/INBOX/Lists");
    }
}
