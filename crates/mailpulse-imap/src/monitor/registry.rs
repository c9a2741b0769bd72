//! Which accounts are monitored, and by which connection.
//!
//! The registry holds at most one [`MonitorSession`] per account. Stealing a
//! connection is the only point where a connection leaves the host's pool,
//! and dropping a record is the only point where a session ends.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

use super::session::{Disposition, MonitorSession, UNSUPPORTED};
use crate::aggregator::Aggregator;
use crate::config::MonitorConfig;
use crate::host::{MailboxHost, Transport};
use crate::timer::{Timer, earliest};
use crate::types::{AccountId, ConnectionId};
use crate::{Error, Result};

/// Account to session map plus deferred steal timers.
pub struct SessionRegistry<C> {
    sessions: HashMap<AccountId, MonitorSession<C>>,
    deferred: HashMap<AccountId, Timer>,
    config: Arc<MonitorConfig>,
}

impl<C: Transport> SessionRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: Arc<MonitorConfig>) -> Self {
        Self {
            sessions: HashMap::new(),
            deferred: HashMap::new(),
            config,
        }
    }

    /// Number of session records, including known-unsupported ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no account has a record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns true if the account has a record, live or not.
    #[must_use]
    pub fn contains(&self, account: &AccountId) -> bool {
        self.sessions.contains_key(account)
    }

    /// The account's session.
    #[must_use]
    pub fn get(&self, account: &AccountId) -> Option<&MonitorSession<C>> {
        self.sessions.get(account)
    }

    /// Returns true if a deferred steal is scheduled for the account.
    #[must_use]
    pub fn has_deferred_steal(&self, account: &AccountId) -> bool {
        self.deferred
            .get(account)
            .is_some_and(Timer::is_armed)
    }

    /// Takes the account's idle connection and starts monitoring on it.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityUnsupported`] if the server rejected both NOTIFY
    ///   and IDLE for this account
    /// - [`Error::AlreadyMonitored`] if the account has any other record
    /// - [`Error::ResourceBusy`] if the pooled connection has a command in flight
    /// - [`Error::NoConnection`] if the pool has nothing to hand over
    /// - any error from writing the startup batch
    ///
    /// The registry is unchanged on error.
    pub fn steal<H>(&mut self, account: &AccountId, host: &mut H) -> Result<()>
    where
        H: MailboxHost<Connection = C>,
    {
        if let Some(session) = self.sessions.get(account) {
            if session.is_unsupported() {
                return Err(Error::CapabilityUnsupported(UNSUPPORTED));
            }
            return Err(Error::AlreadyMonitored(account.clone()));
        }
        if host.is_connection_busy(account) {
            tracing::debug!(%account, "connection busy, not stealing");
            return Err(Error::ResourceBusy(account.clone()));
        }
        let connection = host
            .acquire_idle_connection(account)
            .ok_or_else(|| Error::NoConnection(account.clone()))?;

        let session =
            MonitorSession::start(account.clone(), connection, Arc::clone(&self.config))?;
        self.sessions.insert(account.clone(), session);
        Ok(())
    }

    /// Reports whether the account is being monitored.
    ///
    /// A session whose connection reached end of stream is destroyed and its
    /// record dropped. A known-unsupported record is kept but is not alive.
    pub fn is_alive(&mut self, account: &AccountId) -> bool {
        let Some(session) = self.sessions.get(account) else {
            return false;
        };
        if session.is_unsupported() {
            return false;
        }
        if session.is_eof() {
            tracing::info!(%account, "monitor connection lost");
            self.destroy(account);
            return false;
        }
        true
    }

    /// Destroys the account's session and drops its record.
    ///
    /// Returns true if there was a record.
    pub fn destroy(&mut self, account: &AccountId) -> bool {
        match self.sessions.remove(account) {
            Some(mut session) => {
                session.destroy();
                true
            }
            None => false,
        }
    }

    /// Routes a line to the session that owns `connection`.
    ///
    /// Lines from connections that no longer belong to a session are dropped.
    pub fn handle_line<H>(
        &mut self,
        account: &AccountId,
        connection: ConnectionId,
        line: &str,
        host: &mut H,
        aggregator: &mut Aggregator,
        now: Instant,
    ) -> Disposition
    where
        H: MailboxHost<Connection = C>,
    {
        let Some(session) = self.sessions.get_mut(account) else {
            tracing::trace!(%account, %connection, "line for unmonitored account dropped");
            return Disposition::Keep;
        };
        if session.connection_id() != connection {
            tracing::trace!(%account, %connection, "line from stale connection dropped");
            return Disposition::Keep;
        }

        let disposition = session.handle_line(line, host, aggregator, now);
        if disposition == Disposition::Destroy {
            self.destroy(account);
        }
        disposition
    }

    /// Handles end of stream on a connection.
    pub fn connection_closed(&mut self, account: &AccountId, connection: ConnectionId) {
        let Some(session) = self.sessions.get(account) else {
            return;
        };
        if session.connection_id() != connection || session.is_unsupported() {
            return;
        }
        tracing::info!(%account, %connection, "monitor connection closed");
        self.destroy(account);
    }

    /// Schedules a steal attempt for shortly after the host lists a mailbox.
    ///
    /// Accounts that already have a record or a pending attempt are skipped.
    pub fn schedule_steal(&mut self, account: &AccountId, now: Instant) {
        if self.sessions.contains_key(account) || self.has_deferred_steal(account) {
            return;
        }
        tracing::trace!(%account, "steal scheduled");
        self.deferred
            .entry(account.clone())
            .or_default()
            .arm_once(now, self.config.steal_delay);
    }

    /// Steals for every host account that is not being monitored.
    pub fn on_mail_check_finished<H>(&mut self, host: &mut H)
    where
        H: MailboxHost<Connection = C>,
    {
        for account in host.imap_accounts() {
            if self.is_alive(&account) || self.contains(&account) {
                continue;
            }
            self.try_steal(&account, host);
        }
    }

    /// Fires due session timers and deferred steals.
    pub fn on_timers<H>(&mut self, host: &mut H, now: Instant)
    where
        H: MailboxHost<Connection = C>,
    {
        let mut doomed = Vec::new();
        for (account, session) in &mut self.sessions {
            if session.on_timer(host, now) == Disposition::Destroy {
                doomed.push(account.clone());
            }
        }
        for account in doomed {
            self.destroy(&account);
        }

        let due: Vec<AccountId> = self
            .deferred
            .iter()
            .filter(|(_, timer)| timer.is_due(now))
            .map(|(account, _)| account.clone())
            .collect();
        for account in due {
            if host.is_busy() {
                if let Some(timer) = self.deferred.get_mut(&account) {
                    timer.arm_once(now, self.config.steal_delay);
                }
                continue;
            }
            self.deferred.remove(&account);
            if !self.contains(&account) {
                self.try_steal(&account, host);
            }
        }
    }

    /// Earliest deadline across sessions and deferred steals.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(
            self.sessions
                .values()
                .map(MonitorSession::next_deadline)
                .chain(self.deferred.values().map(Timer::deadline)),
        )
    }

    /// Destroys every session and forgets pending steals.
    pub fn shutdown(&mut self) {
        self.deferred.clear();
        let accounts: Vec<AccountId> = self.sessions.keys().cloned().collect();
        for account in accounts {
            self.destroy(&account);
        }
    }

    fn try_steal<H>(&mut self, account: &AccountId, host: &mut H)
    where
        H: MailboxHost<Connection = C>,
    {
        match self.steal(account, host) {
            Ok(()) => {}
            Err(Error::ResourceBusy(_) | Error::AlreadyMonitored(_)) => {}
            Err(e @ Error::CapabilityUnsupported(_)) => {
                tracing::trace!(%account, error = %e, "not stealing");
            }
            Err(e) => tracing::debug!(%account, error = %e, "steal failed"),
        }
    }
}

impl<C> std::fmt::Debug for SessionRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions)
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
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
    use crate::monitor::session::SessionState;
    use crate::monitor::testing::{MockHost, MockTransport};
    use std::time::Duration;

    const MS: Duration = Duration::from_millis(1);

    fn registry() -> SessionRegistry<MockTransport> {
        SessionRegistry::new(Arc::new(MonitorConfig::default()))
    }

    fn work() -> AccountId {
        AccountId::new("work")
    }

    #[test]
    fn test_steal_starts_session() {
        let mut registry = registry();
        let transport = MockTransport::new();
        let mut host = MockHost::new().with_connection("work", transport.clone());

        registry.steal(&work(), &mut host).unwrap();

        assert!(registry.contains(&work()));
        assert!(registry.is_alive(&work()));
        assert_eq!(transport.sent().len(), 2);
        assert!(!host.has_connection(&work()));
    }

    #[test]
    fn test_steal_busy_leaves_registry_unchanged() {
        let mut registry = registry();
        let transport = MockTransport::new();
        let mut host = MockHost::new().with_connection("work", transport.clone());
        host.set_connection_busy(&work(), true);

        let result = registry.steal(&work(), &mut host);

        assert!(matches!(result, Err(Error::ResourceBusy(_))));
        assert!(registry.is_empty());
        assert!(host.has_connection(&work()));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_steal_without_connection() {
        let mut registry = registry();
        let mut host = MockHost::new();

        let result = registry.steal(&work(), &mut host);
        assert!(matches!(result, Err(Error::NoConnection(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_steal_twice_is_refused() {
        let mut registry = registry();
        let mut host = MockHost::new().with_connection("work", MockTransport::new());
        registry.steal(&work(), &mut host).unwrap();

        host.add_connection("work", MockTransport::new());
        let result = registry.steal(&work(), &mut host);
        assert!(matches!(result, Err(Error::AlreadyMonitored(_))));
        assert_eq!(registry.len(), 1);
        assert!(host.has_connection(&work()));
    }

    #[test]
    fn test_is_alive_destroys_on_eof() {
        let mut registry = registry();
        let transport = MockTransport::new();
        let mut host = MockHost::new().with_connection("work", transport.clone());
        registry.steal(&work(), &mut host).unwrap();

        transport.set_eof();
        assert!(!registry.is_alive(&work()));
        assert!(!registry.contains(&work()));
        assert!(transport.is_closed());
    }

    #[test]
    fn test_unsupported_record_is_kept() {
        let mut registry = registry();
        let mut agg = Aggregator::default();
        let transport = MockTransport::new();
        let mut host = MockHost::new().with_connection("work", transport.clone());
        registry.steal(&work(), &mut host).unwrap();
        let id = transport.id();
        let now = Instant::now();

        registry.handle_line(&work(), id, "N0002 BAD", &mut host, &mut agg, now);
        registry.handle_line(&work(), id, "N0005 BAD", &mut host, &mut agg, now);

        assert!(!registry.is_alive(&work()));
        assert!(registry.contains(&work()));

        host.add_connection("work", MockTransport::new());
        registry.on_mail_check_finished(&mut host);
        assert!(host.has_connection(&work()));
        assert!(matches!(
            registry.steal(&work(), &mut host),
            Err(Error::CapabilityUnsupported(_))
        ));
        assert!(host.has_connection(&work()));
    }

    #[test]
    fn test_bye_removes_record() {
        let mut registry = registry();
        let mut agg = Aggregator::default();
        let transport = MockTransport::new();
        let mut host = MockHost::new().with_connection("work", transport.clone());
        registry.steal(&work(), &mut host).unwrap();

        let disposition = registry.handle_line(
            &work(),
            transport.id(),
            "* BYE idle timeout",
            &mut host,
            &mut agg,
            Instant::now(),
        );

        assert_eq!(disposition, Disposition::Destroy);
        assert!(registry.is_empty());
        assert!(transport.is_closed());
    }

    #[test]
    fn test_stale_connection_lines_dropped() {
        let mut registry = registry();
        let mut agg = Aggregator::default();
        let mut host = MockHost::new().with_connection("work", MockTransport::new());
        registry.steal(&work(), &mut host).unwrap();

        let stale = MockTransport::new();
        let disposition = registry.handle_line(
            &work(),
            stale.id(),
            "* BYE",
            &mut host,
            &mut agg,
            Instant::now(),
        );
        assert_eq!(disposition, Disposition::Keep);
        assert!(registry.contains(&work()));
    }

    #[test]
    fn test_connection_closed() {
        let mut registry = registry();
        let transport = MockTransport::new();
        let mut host = MockHost::new().with_connection("work", transport.clone());
        registry.steal(&work(), &mut host).unwrap();

        registry.connection_closed(&work(), MockTransport::new().id());
        assert!(registry.contains(&work()));

        registry.connection_closed(&work(), transport.id());
        assert!(!registry.contains(&work()));
    }

    #[test]
    fn test_mail_check_steals_for_every_account() {
        let mut registry = registry();
        let mut host = MockHost::new()
            .with_connection("work", MockTransport::new())
            .with_connection("home", MockTransport::new());

        registry.on_mail_check_finished(&mut host);

        assert_eq!(registry.len(), 2);
        let state = registry.get(&AccountId::new("home")).unwrap().state();
        assert_eq!(state, SessionState::Negotiating);
    }

    #[test]
    fn test_deferred_steal_waits_for_host() {
        let mut registry = registry();
        let mut host = MockHost::new().with_connection("work", MockTransport::new());
        let now = Instant::now();

        registry.schedule_steal(&work(), now);
        assert_eq!(registry.next_deadline(), Some(now + 10 * MS));

        host.set_busy(true);
        registry.on_timers(&mut host, now + 10 * MS);
        assert!(registry.is_empty());
        assert_eq!(registry.next_deadline(), Some(now + 20 * MS));

        host.set_busy(false);
        registry.on_timers(&mut host, now + 20 * MS);
        assert!(registry.contains(&work()));
        assert!(!registry.has_deferred_steal(&work()));
    }

    #[test]
    fn test_schedule_steal_skips_monitored_account() {
        let mut registry = registry();
        let mut host = MockHost::new().with_connection("work", MockTransport::new());
        registry.steal(&work(), &mut host).unwrap();

        registry.schedule_steal(&work(), Instant::now());
        assert!(!registry.has_deferred_steal(&work()));
    }

    #[test]
    fn test_shutdown_destroys_everything() {
        let mut registry = registry();
        let transport = MockTransport::new();
        let mut host = MockHost::new()
            .with_connection("work", transport.clone())
            .with_connection("home", MockTransport::new());
        registry.on_mail_check_finished(&mut host);
        registry.schedule_steal(&AccountId::new("other"), Instant::now());

        registry.shutdown();

        assert!(registry.is_empty());
        assert_eq!(registry.next_deadline(), None);
        assert!(transport.is_closed());
    }
}
