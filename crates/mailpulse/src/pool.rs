//! One authenticated connection per account.
//!
//! A connection is either idle in the pool or lent to the monitor. Lent
//! connections leave only their end-of-stream flag behind, so the next mail
//! check can tell when one has died and open a replacement.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mailpulse_imap::connection::{FramedStream, ImapStream, StreamTransport};
use mailpulse_imap::{AccountId, MonitorHandle};
use tokio::io::{AsyncRead, AsyncWrite};

enum Slot<S> {
    Idle(FramedStream<S>),
    Lent(Arc<AtomicBool>),
}

/// Connection pool.
pub struct Pool<S = ImapStream> {
    slots: HashMap<AccountId, Slot<S>>,
    opening: HashSet<AccountId>,
    checking: bool,
}

/// Pool shared between the mail check task and the monitor's host.
pub type SharedPool<S = ImapStream> = Arc<Mutex<Pool<S>>>;

/// Locks a shared pool. The pool holds no invariants a panic could break, so a
/// poisoned lock is still usable.
pub fn lock<S>(pool: &SharedPool<S>) -> MutexGuard<'_, Pool<S>> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S> Default for Pool<S> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            opening: HashSet::new(),
            checking: false,
        }
    }
}

impl<S> Pool<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Creates an empty shared pool.
    pub fn shared() -> SharedPool<S> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Returns true if the account has no usable connection.
    pub fn needs_connection(&self, account: &AccountId) -> bool {
        match self.slots.get(account) {
            None => !self.opening.contains(account),
            Some(Slot::Idle(_)) => false,
            Some(Slot::Lent(eof)) => eof.load(Ordering::SeqCst),
        }
    }

    /// Marks the account's connection as being opened.
    pub fn begin_open(&mut self, account: &AccountId) {
        self.slots.remove(account);
        self.opening.insert(account.clone());
    }

    /// Stores a freshly opened connection, or clears the opening mark on
    /// failure.
    pub fn finish_open(&mut self, account: &AccountId, stream: Option<FramedStream<S>>) {
        self.opening.remove(account);
        if let Some(stream) = stream {
            self.slots.insert(account.clone(), Slot::Idle(stream));
        }
    }

    /// Returns true while the account's connection is being opened.
    pub fn is_opening(&self, account: &AccountId) -> bool {
        self.opening.contains(account)
    }

    /// Returns true if the account has an idle connection.
    pub fn has_idle(&self, account: &AccountId) -> bool {
        matches!(self.slots.get(account), Some(Slot::Idle(_)))
    }

    /// Hands the account's idle connection to the monitor.
    pub fn lend(&mut self, account: &AccountId, events: &MonitorHandle) -> Option<StreamTransport> {
        match self.slots.remove(account)? {
            Slot::Idle(stream) => {
                let transport = StreamTransport::spawn(stream, account.clone(), events.clone());
                self.slots
                    .insert(account.clone(), Slot::Lent(transport.eof_flag()));
                Some(transport)
            }
            lent @ Slot::Lent(_) => {
                self.slots.insert(account.clone(), lent);
                None
            }
        }
    }

    /// Marks a mail check as running or finished.
    pub const fn set_checking(&mut self, checking: bool) {
        self.checking = checking;
    }

    /// Returns true while a mail check is running.
    pub const fn is_checking(&self) -> bool {
        self.checking
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailpulse_imap::Transport;
    use mailpulse_imap::monitor::channel;
    use tokio::io::DuplexStream;

    fn work() -> AccountId {
        AccountId::new("work")
    }

    #[tokio::test]
    async fn test_lend_then_reopen_after_close() {
        let (local, _remote) = tokio::io::duplex(256);
        let (handle, _events) = channel();
        let mut pool: Pool<DuplexStream> = Pool::default();

        assert!(pool.needs_connection(&work()));
        pool.begin_open(&work());
        assert!(pool.is_opening(&work()));
        assert!(!pool.needs_connection(&work()));

        pool.finish_open(&work(), Some(FramedStream::new(local)));
        assert!(pool.has_idle(&work()));
        assert!(!pool.needs_connection(&work()));

        let mut transport = pool.lend(&work(), &handle).unwrap();
        assert!(!pool.has_idle(&work()));
        assert!(!pool.needs_connection(&work()));
        assert!(pool.lend(&work(), &handle).is_none());

        transport.close();
        assert!(pool.needs_connection(&work()));
    }

    #[test]
    fn test_failed_open_clears_mark() {
        let mut pool: Pool<DuplexStream> = Pool::default();
        pool.begin_open(&work());
        pool.finish_open(&work(), None);
        assert!(!pool.is_opening(&work()));
        assert!(pool.needs_connection(&work()));
    }
}
