//! In-memory transport and host for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::host::{MailboxHost, Transport};
use crate::types::{AccountId, ConnectionId, MailboxCounts, MailboxRef};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Wire {
    sent: Vec<String>,
    eof: bool,
    closed: bool,
}

/// Transport recording every line; clones share the same wire.
#[derive(Debug, Clone)]
pub struct MockTransport {
    id: ConnectionId,
    wire: Arc<Mutex<Wire>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::next(),
            wire: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.wire.lock().unwrap().sent.clone()
    }

    pub fn clear(&self) {
        self.wire.lock().unwrap().sent.clear();
    }

    pub fn set_eof(&self) {
        self.wire.lock().unwrap().eof = true;
    }

    pub fn is_closed(&self) -> bool {
        self.wire.lock().unwrap().closed
    }
}

impl Transport for MockTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&mut self, line: &str) -> Result<()> {
        let mut wire = self.wire.lock().unwrap();
        if wire.eof || wire.closed {
            return Err(Error::TransportClosed);
        }
        wire.sent.push(line.to_string());
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.wire.lock().unwrap().eof
    }

    fn close(&mut self) {
        let mut wire = self.wire.lock().unwrap();
        wire.closed = true;
        wire.eof = true;
    }
}

/// Host with a connection pool and mailbox counters held in maps.
#[derive(Debug, Default)]
pub struct MockHost {
    accounts: BTreeSet<AccountId>,
    mailboxes: BTreeSet<MailboxRef>,
    pool: HashMap<AccountId, MockTransport>,
    busy_connections: BTreeSet<AccountId>,
    busy: bool,
    counts: BTreeMap<MailboxRef, MailboxCounts>,
    dirty: BTreeSet<MailboxRef>,
    redisplayed: Vec<MailboxRef>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mailbox(mut self, account: &str, path: &str) -> Self {
        let account = AccountId::new(account);
        self.accounts.insert(account.clone());
        self.mailboxes.insert(MailboxRef::new(account, path));
        self
    }

    pub fn with_connection(mut self, account: &str, transport: MockTransport) -> Self {
        self.add_connection(account, transport);
        self
    }

    pub fn add_connection(&mut self, account: &str, transport: MockTransport) {
        let account = AccountId::new(account);
        self.accounts.insert(account.clone());
        self.pool.insert(account, transport);
    }

    pub fn has_connection(&self, account: &AccountId) -> bool {
        self.pool.contains_key(account)
    }

    pub fn set_connection_busy(&mut self, account: &AccountId, busy: bool) {
        if busy {
            self.busy_connections.insert(account.clone());
        } else {
            self.busy_connections.remove(account);
        }
    }

    pub const fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn set_counts(&mut self, mailbox: &MailboxRef, counts: MailboxCounts) {
        self.counts.insert(mailbox.clone(), counts);
    }

    pub fn counts(&self, mailbox: &MailboxRef) -> MailboxCounts {
        self.counts.get(mailbox).copied().unwrap_or_default()
    }

    pub fn is_dirty(&self, mailbox: &MailboxRef) -> bool {
        self.dirty.contains(mailbox)
    }

    pub fn dirty(&self) -> Vec<MailboxRef> {
        self.dirty.iter().cloned().collect()
    }

    pub fn redisplayed(&self) -> Vec<MailboxRef> {
        self.redisplayed.clone()
    }
}

impl MailboxHost for MockHost {
    type Connection = MockTransport;

    fn imap_accounts(&self) -> Vec<AccountId> {
        self.accounts.iter().cloned().collect()
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn is_connection_busy(&self, account: &AccountId) -> bool {
        self.busy_connections.contains(account)
    }

    fn acquire_idle_connection(&mut self, account: &AccountId) -> Option<MockTransport> {
        self.pool.remove(account)
    }

    fn lookup_mailbox(&self, account: &AccountId, path: &str) -> Option<MailboxRef> {
        let mailbox = MailboxRef::new(account.clone(), path);
        self.mailboxes.contains(&mailbox).then_some(mailbox)
    }

    fn mailbox_counts(&self, mailbox: &MailboxRef) -> MailboxCounts {
        self.counts(mailbox)
    }

    fn update_mailbox_counts(&mut self, mailbox: &MailboxRef, counts: MailboxCounts) {
        self.set_counts(mailbox, counts);
    }

    fn mark_mailbox_dirty(&mut self, mailbox: &MailboxRef) {
        self.dirty.insert(mailbox.clone());
    }

    fn redisplay_mailbox(&mut self, mailbox: &MailboxRef) {
        self.redisplayed.push(mailbox.clone());
    }
}
