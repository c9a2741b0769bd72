//! The in-memory mail model the monitor updates.
//!
//! There is no mail store here; "redisplaying" a mailbox logs its counters.

use std::collections::{BTreeMap, BTreeSet};

use mailpulse_imap::connection::{ImapStream, StreamTransport};
use mailpulse_imap::{AccountId, MailboxCounts, MailboxHost, MailboxRef, MonitorHandle};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::pool::{SharedPool, lock};

/// Accounts, their watched mailboxes, and the shared connection pool.
pub struct DesktopHost<S = ImapStream> {
    mailboxes: BTreeMap<AccountId, Vec<String>>,
    pool: SharedPool<S>,
    events: MonitorHandle,
    counts: BTreeMap<MailboxRef, MailboxCounts>,
    dirty: BTreeSet<MailboxRef>,
}

impl<S> DesktopHost<S> {
    /// Creates a host for `accounts`, each with its watched mailbox paths.
    pub fn new(
        accounts: impl IntoIterator<Item = (AccountId, Vec<String>)>,
        pool: SharedPool<S>,
        events: MonitorHandle,
    ) -> Self {
        Self {
            mailboxes: accounts.into_iter().collect(),
            pool,
            events,
            counts: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Returns true if the mailbox changed since it was last redisplayed.
    pub fn is_dirty(&self, mailbox: &MailboxRef) -> bool {
        self.dirty.contains(mailbox)
    }
}

impl<S> MailboxHost for DesktopHost<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Connection = StreamTransport;

    fn imap_accounts(&self) -> Vec<AccountId> {
        self.mailboxes.keys().cloned().collect()
    }

    fn is_busy(&self) -> bool {
        lock(&self.pool).is_checking()
    }

    fn is_connection_busy(&self, account: &AccountId) -> bool {
        lock(&self.pool).is_opening(account)
    }

    fn acquire_idle_connection(&mut self, account: &AccountId) -> Option<StreamTransport> {
        lock(&self.pool).lend(account, &self.events)
    }

    fn lookup_mailbox(&self, account: &AccountId, path: &str) -> Option<MailboxRef> {
        let watched = self.mailboxes.get(account)?;
        let found = watched.iter().find(|candidate| {
            *candidate == path
                || (candidate.eq_ignore_ascii_case("INBOX") && path.eq_ignore_ascii_case("INBOX"))
        })?;
        Some(MailboxRef::new(account.clone(), found.as_str()))
    }

    fn mailbox_counts(&self, mailbox: &MailboxRef) -> MailboxCounts {
        self.counts.get(mailbox).copied().unwrap_or_default()
    }

    fn update_mailbox_counts(&mut self, mailbox: &MailboxRef, counts: MailboxCounts) {
        self.counts.insert(mailbox.clone(), counts);
    }

    fn mark_mailbox_dirty(&mut self, mailbox: &MailboxRef) {
        self.dirty.insert(mailbox.clone());
    }

    fn redisplay_mailbox(&mut self, mailbox: &MailboxRef) {
        self.dirty.remove(mailbox);
        let counts = self.mailbox_counts(mailbox);
        tracing::info!(
            account = %mailbox.account,
            mailbox = %mailbox.path,
            total = counts.total,
            unread = counts.unread,
            new = counts.new,
            "mailbox updated"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use mailpulse_imap::monitor::channel;
    use tokio::io::DuplexStream;

    fn host() -> DesktopHost<DuplexStream> {
        let (handle, _events) = channel();
        DesktopHost::new(
            [(
                AccountId::new("work"),
                vec!["INBOX".to_string(), "Lists/rust".to_string()],
            )],
            Pool::shared(),
            handle,
        )
    }

    #[test]
    fn test_lookup_watched_mailboxes_only() {
        let host = host();
        let work = AccountId::new("work");

        assert_eq!(
            host.lookup_mailbox(&work, "inbox"),
            Some(MailboxRef::new(work.clone(), "INBOX"))
        );
        assert!(host.lookup_mailbox(&work, "Lists/rust").is_some());
        assert!(host.lookup_mailbox(&work, "Lists/go").is_none());
        assert!(host.lookup_mailbox(&AccountId::new("home"), "INBOX").is_none());
    }

    #[test]
    fn test_redisplay_clears_dirty() {
        let mut host = host();
        let inbox = MailboxRef::new(AccountId::new("work"), "INBOX");
        let counts = MailboxCounts {
            total: 3,
            unread: 1,
            new: 1,
            last_seen_uid: Some(3),
        };

        host.update_mailbox_counts(&inbox, counts);
        host.mark_mailbox_dirty(&inbox);
        assert!(host.is_dirty(&inbox));
        assert_eq!(host.mailbox_counts(&inbox), counts);

        host.redisplay_mailbox(&inbox);
        assert!(!host.is_dirty(&inbox));
    }

    #[test]
    fn test_busy_follows_pool() {
        let host = host();
        let work = AccountId::new("work");
        assert!(!host.is_busy());

        lock(&host.pool).set_checking(true);
        lock(&host.pool).begin_open(&work);
        assert!(host.is_busy());
        assert!(host.is_connection_busy(&work));
    }
}
