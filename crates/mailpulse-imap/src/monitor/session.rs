//! One monitored connection.
//!
//! ```text
//!                 T2 OK                   NOOP every keepalive_interval
//! Negotiating ──────────────→ Active(Notify)
//!      │
//!      │ T2 BAD/NO: T4 SELECT INBOX, T5 IDLE
//!      ▼
//! Active(IdleFallback) ── refresh: DONE, T5 OK: IDLE ──┐
//!      │                ←─────────────────────────────┘
//!      │ T5 BAD/NO
//!      ▼
//! Terminated(Unsupported)
//! ```
//!
//! A `* BYE` in any state asks the registry to destroy the session.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::time::Instant;

use crate::aggregator::Aggregator;
use crate::command::{Command, CommandTag, TagCycle};
use crate::config::MonitorConfig;
use crate::host::{MailboxHost, Transport};
use crate::parser::{
    Completion, HeaderField, NumericEvent, ResponseLine, classify, decode_header_value, host_path,
    parse_status_att_list,
};
use crate::timer::{Timer, earliest};
use crate::types::{AccountId, ConnectionId, MailboxRef, MessageSummary};
use crate::{Error, Result};

/// Path of the mailbox the session selects.
pub const INBOX: &str = "INBOX";

/// Extensions a session needs, at least one of.
pub(crate) const UNSUPPORTED: &str = "NOTIFY or IDLE";

/// How new mail is pushed on an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// NOTIFY SET accepted (RFC 5465).
    Notify,
    /// NOTIFY refused; IDLE on INBOX (RFC 2177).
    IdleFallback,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The server refused both NOTIFY and IDLE.
    Unsupported,
    /// The connection was closed.
    Closed,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Startup batch sent, NOTIFY answer pending.
    Negotiating,
    /// Receiving pushes.
    Active(Mode),
    /// No longer monitoring.
    Terminated(Termination),
}

/// What the owner should do after the session handled an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing to do.
    Keep,
    /// NOTIFY was just accepted.
    Ready,
    /// Destroy the session and drop its record.
    Destroy,
}

/// Monitoring state machine for one stolen connection.
pub struct MonitorSession<C> {
    account: AccountId,
    connection: C,
    config: Arc<MonitorConfig>,
    tags: TagCycle,
    state: SessionState,
    pending_summary: Option<MessageSummary>,
    open_header: Option<(HeaderField, String)>,
    keepalive: Timer,
    idle_refresh: Timer,
    redisplay: Timer,
    redisplay_pending: BTreeSet<MailboxRef>,
}

impl<C: Transport> MonitorSession<C> {
    /// Takes ownership of a connection and sends the startup batch.
    ///
    /// With summaries enabled the batch selects INBOX so the server can push
    /// From/Subject of new INBOX mail; otherwise it closes any selected
    /// mailbox and subscribes to new-message events only.
    ///
    /// # Errors
    ///
    /// Returns an error if the startup batch cannot be written.
    pub fn start(account: AccountId, connection: C, config: Arc<MonitorConfig>) -> Result<Self> {
        let mut session = Self {
            account,
            connection,
            tags: TagCycle::new(config.tag_prefix),
            config,
            state: SessionState::Negotiating,
            pending_summary: None,
            open_header: None,
            keepalive: Timer::new(),
            idle_refresh: Timer::new(),
            redisplay: Timer::new(),
            redisplay_pending: BTreeSet::new(),
        };

        let summaries = session.config.show_summaries;
        let prepare = if summaries {
            Command::select_inbox()
        } else {
            Command::Close
        };
        session.send(CommandTag::Prepare, &prepare)?;
        session.send(CommandTag::Notify, &Command::NotifySet { summaries })?;

        tracing::info!(
            account = %session.account,
            connection = %session.connection.id(),
            summaries,
            "monitor session started"
        );
        Ok(session)
    }

    /// The monitored account.
    #[must_use]
    pub const fn account(&self) -> &AccountId {
        &self.account
    }

    /// Identity of the owned connection.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// The owned connection.
    #[must_use]
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Push mode, once negotiated.
    #[must_use]
    pub const fn mode(&self) -> Option<Mode> {
        match self.state {
            SessionState::Active(mode) => Some(mode),
            _ => None,
        }
    }

    /// Returns true if the server refused both NOTIFY and IDLE.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(
            self.state,
            SessionState::Terminated(Termination::Unsupported)
        )
    }

    /// Returns true if the connection reached end of stream.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.connection.is_eof()
    }

    /// The most recently issued command role.
    #[must_use]
    pub const fn current_tag(&self) -> Option<CommandTag> {
        self.tags.current()
    }

    /// NOOP keepalive timer (armed in NOTIFY mode).
    #[must_use]
    pub const fn keepalive_timer(&self) -> &Timer {
        &self.keepalive
    }

    /// DONE/IDLE refresh timer (armed in IDLE fallback).
    #[must_use]
    pub const fn idle_refresh_timer(&self) -> &Timer {
        &self.idle_refresh
    }

    /// The summary whose FETCH literal is still streaming in.
    #[must_use]
    pub const fn pending_summary(&self) -> Option<&MessageSummary> {
        self.pending_summary.as_ref()
    }

    /// Earliest deadline of any armed timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.keepalive.deadline(),
            self.idle_refresh.deadline(),
            self.redisplay.deadline(),
        ])
    }

    /// Handles one line from the server.
    pub fn handle_line<H>(
        &mut self,
        line: &str,
        host: &mut H,
        aggregator: &mut Aggregator,
        now: Instant,
    ) -> Disposition
    where
        H: MailboxHost,
    {
        tracing::trace!(account = %self.account, "IMAP<< {}", line.trim_end());

        if matches!(self.state, SessionState::Terminated(_)) {
            return Disposition::Keep;
        }

        let response = classify(line, &self.tags);
        if !matches!(response, Ok(ResponseLine::HeaderContinuation(_))) {
            self.close_header(aggregator, now);
        }
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(account = %self.account, error = %e, "unparseable line");
                return Disposition::Keep;
            }
        };

        match response {
            ResponseLine::Tagged {
                tag,
                completion,
                text,
            } => self.on_tagged(tag, completion, text, now),
            ResponseLine::Continuation(text) => {
                tracing::trace!(account = %self.account, text, "continuation");
                Disposition::Keep
            }
            ResponseLine::Numeric { number, event } => {
                self.on_numeric(number, event, host, aggregator, now);
                Disposition::Keep
            }
            ResponseLine::Status {
                mailbox,
                attributes,
            } => {
                self.on_status(&mailbox, attributes, host, now);
                Disposition::Keep
            }
            ResponseLine::Bye(text) => {
                tracing::info!(account = %self.account, text, "server closed monitor connection");
                Disposition::Destroy
            }
            ResponseLine::Header { field, value } => {
                self.on_header(field, value);
                Disposition::Keep
            }
            ResponseLine::HeaderContinuation(text) => {
                match self.open_header.as_mut() {
                    Some((_, value)) => value.push_str(text),
                    None => tracing::trace!(account = %self.account, "stray continuation line"),
                }
                Disposition::Keep
            }
            ResponseLine::LiteralEnd => {
                self.hand_off_summary(aggregator, now);
                Disposition::Keep
            }
            ResponseLine::Unclassified => Disposition::Keep,
        }
    }

    /// Fires due timers.
    pub fn on_timer<H>(&mut self, host: &mut H, now: Instant) -> Disposition
    where
        H: MailboxHost,
    {
        if self.keepalive.fire(now) {
            tracing::debug!(account = %self.account, "keepalive");
            if let Err(e) = self.send(CommandTag::Keepalive, &Command::Noop) {
                tracing::warn!(account = %self.account, error = %e, "keepalive failed");
                return Disposition::Destroy;
            }
        }

        if self.idle_refresh.fire(now) {
            tracing::debug!(account = %self.account, "refreshing IDLE");
            if let Err(e) = self.send_done() {
                tracing::warn!(account = %self.account, error = %e, "IDLE refresh failed");
                return Disposition::Destroy;
            }
        }

        if self.redisplay.fire(now) {
            for mailbox in std::mem::take(&mut self.redisplay_pending) {
                host.redisplay_mailbox(&mailbox);
            }
        }

        Disposition::Keep
    }

    /// Cancels every timer, then closes the connection.
    pub fn destroy(&mut self) {
        self.cancel_timers();
        self.pending_summary = None;
        self.open_header = None;
        self.connection.close();
        if !self.is_unsupported() {
            self.state = SessionState::Terminated(Termination::Closed);
        }
        tracing::info!(account = %self.account, "monitor session destroyed");
    }

    fn on_tagged(
        &mut self,
        tag: CommandTag,
        completion: Completion,
        text: &str,
        now: Instant,
    ) -> Disposition {
        let accepted = completion == Completion::Ok;
        match tag {
            CommandTag::Notify if self.state == SessionState::Negotiating => {
                if accepted {
                    self.state = SessionState::Active(Mode::Notify);
                    self.keepalive
                        .arm_recurring(now, self.config.keepalive_interval);
                    tracing::info!(account = %self.account, "NOTIFY enabled");
                    return Disposition::Ready;
                }
                tracing::warn!(
                    account = %self.account,
                    text,
                    "NOTIFY not supported, falling back to IDLE"
                );
                self.enter_idle_fallback(now)
            }
            CommandTag::Idle if self.mode() == Some(Mode::IdleFallback) => {
                if accepted {
                    return match self.send(CommandTag::Idle, &Command::Idle) {
                        Ok(()) => Disposition::Keep,
                        Err(e) => {
                            tracing::warn!(account = %self.account, error = %e, "re-IDLE failed");
                            Disposition::Destroy
                        }
                    };
                }
                let error = Error::CapabilityUnsupported(UNSUPPORTED);
                tracing::warn!(
                    account = %self.account,
                    text,
                    %error,
                    "account will not be monitored"
                );
                self.cancel_timers();
                self.connection.close();
                self.state = SessionState::Terminated(Termination::Unsupported);
                Disposition::Keep
            }
            _ if accepted => {
                tracing::trace!(account = %self.account, ?tag, "command completed");
                Disposition::Keep
            }
            _ => {
                tracing::warn!(account = %self.account, ?tag, ?completion, text, "command failed");
                Disposition::Keep
            }
        }
    }

    fn enter_idle_fallback(&mut self, now: Instant) -> Disposition {
        let sent = self
            .send(CommandTag::Select, &Command::select_inbox())
            .and_then(|()| self.send(CommandTag::Idle, &Command::Idle));
        if let Err(e) = sent {
            tracing::warn!(account = %self.account, error = %e, "IDLE fallback failed");
            return Disposition::Destroy;
        }

        self.state = SessionState::Active(Mode::IdleFallback);
        self.idle_refresh
            .arm_recurring(now, self.config.idle_refresh_interval);
        Disposition::Keep
    }

    fn on_numeric<H>(
        &mut self,
        number: u32,
        event: NumericEvent<'_>,
        host: &mut H,
        aggregator: &mut Aggregator,
        now: Instant,
    ) where
        H: MailboxHost,
    {
        match event {
            NumericEvent::Exists => {
                tracing::debug!(account = %self.account, count = number, "EXISTS");
                if let Some(inbox) = host.lookup_mailbox(&self.account, INBOX) {
                    let mut counts = host.mailbox_counts(&inbox);
                    counts.total = number;
                    host.update_mailbox_counts(&inbox, counts);
                    self.touch(host, inbox, now);
                }
            }
            NumericEvent::Recent => {
                tracing::debug!(account = %self.account, count = number, "RECENT");
                if number == 0 {
                    return;
                }
                if let Some(inbox) = host.lookup_mailbox(&self.account, INBOX) {
                    let mut counts = host.mailbox_counts(&inbox);
                    counts.unread = counts
                        .unread
                        .saturating_add(number.saturating_sub(counts.new));
                    counts.new = number;
                    host.update_mailbox_counts(&inbox, counts);
                    self.touch(host, inbox, now);
                }
            }
            NumericEvent::Expunge => {
                // Sequence numbers are not tracked; the host recounts on its next sync.
                tracing::debug!(account = %self.account, seq = number, "EXPUNGE");
            }
            NumericEvent::FetchLiteral => {
                tracing::debug!(account = %self.account, seq = number, "FETCH with headers");
                self.hand_off_summary(aggregator, now);
                self.pending_summary = Some(MessageSummary::new());
                if let Some(inbox) = host.lookup_mailbox(&self.account, INBOX) {
                    self.touch(host, inbox, now);
                }
            }
            NumericEvent::Fetch => {
                tracing::trace!(account = %self.account, seq = number, "FETCH");
            }
            NumericEvent::Other(name) => {
                tracing::debug!(
                    account = %self.account,
                    number,
                    name,
                    "unhandled numeric response"
                );
            }
        }
    }

    fn on_status<H>(&mut self, mailbox: &str, attributes: &str, host: &mut H, now: Instant)
    where
        H: MailboxHost,
    {
        let decoded = match parse_status_att_list(attributes) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(
                    account = %self.account,
                    mailbox,
                    error = %e,
                    "invalid STATUS response"
                );
                return;
            }
        };

        let path = host_path(mailbox, self.config.hierarchy_delimiter);
        let Some(target) = host.lookup_mailbox(&self.account, &path) else {
            tracing::debug!(account = %self.account, mailbox = %path, "STATUS for unknown mailbox");
            return;
        };

        let status = decoded.status;
        tracing::debug!(
            account = %self.account,
            mailbox = %path,
            messages = ?status.messages,
            recent = ?status.recent,
            unseen = ?status.unseen,
            uid_next = ?status.uid_next,
            uid_validity = ?status.uid_validity,
            "STATUS"
        );

        let mut counts = host.mailbox_counts(&target);
        if let Some(messages) = status.messages {
            counts.total = messages;
        }
        if let Some(unseen) = status.unseen {
            counts.new = unseen.saturating_sub(counts.unread);
            counts.unread = unseen;
        }
        if let Some(uid_next) = status.uid_next {
            counts.last_seen_uid = Some(uid_next.saturating_sub(1));
        }
        host.update_mailbox_counts(&target, counts);
        self.touch(host, target, now);
    }

    fn on_header(&mut self, field: HeaderField, value: &str) {
        if self.pending_summary.is_none() {
            tracing::trace!(account = %self.account, ?field, "header outside FETCH literal");
            return;
        }
        self.open_header = Some((field, value.to_string()));
    }

    /// Stores the unfolded value of the header being collected, handing the
    /// summary off once both fields are in.
    fn close_header(&mut self, aggregator: &mut Aggregator, now: Instant) {
        let Some((field, value)) = self.open_header.take() else {
            return;
        };
        let Some(summary) = self.pending_summary.as_mut() else {
            return;
        };

        let decoded = decode_header_value(&value);
        match field {
            HeaderField::From => summary.from = Some(decoded),
            HeaderField::Subject => summary.subject = Some(decoded),
        }

        if summary.is_complete() {
            self.hand_off_summary(aggregator, now);
        }
    }

    fn hand_off_summary(&mut self, aggregator: &mut Aggregator, now: Instant) {
        if let Some(summary) = self.pending_summary.take() {
            aggregator.add(summary, now);
        }
    }

    /// Marks a mailbox dirty and schedules a debounced redisplay.
    fn touch<H>(&mut self, host: &mut H, mailbox: MailboxRef, now: Instant)
    where
        H: MailboxHost,
    {
        host.mark_mailbox_dirty(&mailbox);
        if self.redisplay_pending.insert(mailbox) && !self.redisplay.is_armed() {
            self.redisplay.arm_once(now, self.config.redisplay_delay);
        }
    }

    fn cancel_timers(&mut self) {
        self.keepalive.cancel();
        self.idle_refresh.cancel();
        self.redisplay.cancel();
        self.redisplay_pending.clear();
    }

    fn send(&mut self, role: CommandTag, command: &Command) -> Result<()> {
        let tag = self.tags.issue(role);
        let line = command.serialize(&tag);
        tracing::trace!(account = %self.account, "IMAP>> {line}");
        self.connection.send(&line)
    }

    fn send_done(&mut self) -> Result<()> {
        tracing::trace!(account = %self.account, "IMAP>> DONE");
        self.connection.send(&Command::Done.serialize(""))
    }
}

impl<C> std::fmt::Debug for MonitorSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("account", &self.account)
            .field("state", &self.state)
            .field("current_tag", &self.tags.current())
            .field("pending_summary", &self.pending_summary)
            .field("keepalive", &self.keepalive)
            .field("idle_refresh", &self.idle_refresh)
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
    use crate::monitor::testing::{MockHost, MockTransport};
    use crate::types::MailboxCounts;
    use std::time::Duration;

    const MIN: Duration = Duration::from_secs(60);

    fn start(config: MonitorConfig) -> (MonitorSession<MockTransport>, MockTransport, Instant) {
        let transport = MockTransport::new();
        let handle = transport.clone();
        let now = Instant::now();
        let session =
            MonitorSession::start(AccountId::new("work"), transport, Arc::new(config)).unwrap();
        (session, handle, now)
    }

    fn host() -> MockHost {
        MockHost::new()
            .with_mailbox("work", "INBOX")
            .with_mailbox("work", "INBOX/Lists")
    }

    #[test]
    fn test_startup_batch_with_summaries() {
        let (session, transport, _) = start(MonitorConfig::default());
        assert_eq!(
            transport.sent(),
            vec![
                "N0001 SELECT INBOX".to_string(),
                "N0002 NOTIFY SET (selected (MessageExpunge MessageNew \
                 (uid body.peek[header.fields (from subject)]))) (inboxes (MessageNew))"
                    .to_string(),
            ]
        );
        assert_eq!(session.state(), SessionState::Negotiating);
        assert_eq!(session.current_tag(), Some(CommandTag::Notify));
    }

    #[test]
    fn test_startup_batch_without_summaries() {
        let (_, transport, _) = start(MonitorConfig::default().show_summaries(false));
        assert_eq!(
            transport.sent(),
            vec![
                "N0001 CLOSE".to_string(),
                "N0002 NOTIFY SET (inboxes (MessageNew))".to_string(),
            ]
        );
    }

    #[test]
    fn test_start_fails_on_closed_transport() {
        let transport = MockTransport::new();
        transport.set_eof();
        let result = MonitorSession::start(
            AccountId::new("work"),
            transport,
            Arc::new(MonitorConfig::default()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_notify_ok_arms_keepalive() {
        let (mut session, transport, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        let disposition = session.handle_line("N0002 OK NOTIFY done", &mut host, &mut agg, now);
        assert_eq!(disposition, Disposition::Ready);
        assert_eq!(session.mode(), Some(Mode::Notify));
        assert_eq!(session.keepalive_timer().deadline(), Some(now + 29 * MIN));
        assert!(!session.idle_refresh_timer().is_armed());

        transport.clear();
        session.on_timer(&mut host, now + 29 * MIN);
        assert_eq!(transport.sent(), vec!["N0003 NOOP".to_string()]);
        assert_eq!(session.keepalive_timer().deadline(), Some(now + 58 * MIN));
    }

    #[test]
    fn test_notify_bad_falls_back_to_idle() {
        let (mut session, transport, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();
        transport.clear();

        let disposition =
            session.handle_line("N0002 BAD Unknown command", &mut host, &mut agg, now);
        assert_eq!(disposition, Disposition::Keep);
        assert_eq!(session.mode(), Some(Mode::IdleFallback));
        assert_eq!(
            transport.sent(),
            vec!["N0004 SELECT INBOX".to_string(), "N0005 IDLE".to_string()]
        );
        assert!(!session.keepalive_timer().is_armed());
        assert_eq!(session.idle_refresh_timer().deadline(), Some(now + 29 * MIN));
    }

    #[test]
    fn test_notify_no_is_treated_like_bad() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line("N0002 NO not now", &mut host, &mut agg, now);
        assert_eq!(session.mode(), Some(Mode::IdleFallback));
    }

    #[test]
    fn test_idle_refresh_cycle() {
        let (mut session, transport, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line("N0002 BAD no NOTIFY", &mut host, &mut agg, now);
        session.handle_line("N0004 OK [READ-WRITE] selected", &mut host, &mut agg, now);
        session.handle_line("+ idling", &mut host, &mut agg, now);
        transport.clear();

        session.on_timer(&mut host, now + 29 * MIN);
        assert_eq!(transport.sent(), vec!["DONE".to_string()]);

        session.handle_line("N0005 OK IDLE terminated", &mut host, &mut agg, now + 29 * MIN);
        assert_eq!(transport.sent(), vec!["DONE".to_string(), "N0005 IDLE".to_string()]);
        assert_eq!(session.mode(), Some(Mode::IdleFallback));
        assert!(!session.keepalive_timer().is_armed());
        assert!(session.idle_refresh_timer().is_armed());
    }

    #[test]
    fn test_idle_bad_terminates_as_unsupported() {
        let (mut session, transport, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line("N0002 BAD", &mut host, &mut agg, now);
        let disposition = session.handle_line("N0005 BAD no IDLE", &mut host, &mut agg, now);

        assert_eq!(disposition, Disposition::Keep);
        assert!(session.is_unsupported());
        assert!(transport.is_closed());
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn test_mode_is_set_once() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line("N0002 OK", &mut host, &mut agg, now);
        let disposition = session.handle_line("N0002 BAD late", &mut host, &mut agg, now);
        assert_eq!(disposition, Disposition::Keep);
        assert_eq!(session.mode(), Some(Mode::Notify));
    }

    #[test]
    fn test_bye_requests_destroy() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        assert_eq!(
            session.handle_line("* BYE shutting down", &mut host, &mut agg, now),
            Disposition::Destroy
        );
    }

    #[test]
    fn test_destroy_cancels_timers_before_close() {
        let (mut session, transport, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line("N0002 OK", &mut host, &mut agg, now);
        session.handle_line("* 4 EXISTS", &mut host, &mut agg, now);
        assert!(session.next_deadline().is_some());

        session.destroy();
        assert_eq!(session.next_deadline(), None);
        assert!(transport.is_closed());
        assert_eq!(session.state(), SessionState::Terminated(Termination::Closed));

        transport.clear();
        session.on_timer(&mut host, now + 60 * MIN);
        assert!(transport.sent().is_empty());
        assert!(host.redisplayed().is_empty());
    }

    #[test]
    fn test_exists_updates_total_and_redisplays_once() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();
        let inbox = MailboxRef::new(AccountId::new("work"), "INBOX");

        session.handle_line("* 12 EXISTS", &mut host, &mut agg, now);
        session.handle_line("* 13 EXISTS", &mut host, &mut agg, now + Duration::from_millis(10));

        assert_eq!(host.counts(&inbox).total, 13);
        assert!(host.is_dirty(&inbox));
        assert!(host.redisplayed().is_empty());

        session.on_timer(&mut host, now + Duration::from_millis(50));
        assert_eq!(host.redisplayed(), vec![inbox]);
    }

    #[test]
    fn test_recent_updates_unread_and_new() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();
        let inbox = MailboxRef::new(AccountId::new("work"), "INBOX");
        host.set_counts(
            &inbox,
            MailboxCounts {
                total: 10,
                unread: 3,
                new: 1,
                last_seen_uid: None,
            },
        );

        session.handle_line("* 3 RECENT", &mut host, &mut agg, now);
        let counts = host.counts(&inbox);
        assert_eq!(counts.new, 3);
        assert_eq!(counts.unread, 5);

        session.handle_line("* 0 RECENT", &mut host, &mut agg, now);
        assert_eq!(host.counts(&inbox), counts);
    }

    #[test]
    fn test_expunge_is_log_only() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();
        let inbox = MailboxRef::new(AccountId::new("work"), "INBOX");

        session.handle_line("* 2 EXPUNGE", &mut host, &mut agg, now);
        assert!(!host.is_dirty(&inbox));
        assert_eq!(host.counts(&inbox), MailboxCounts::default());
    }

    #[test]
    fn test_status_applies_counts() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();
        let lists = MailboxRef::new(AccountId::new("work"), "INBOX/Lists");
        host.set_counts(
            &lists,
            MailboxCounts {
                total: 2,
                unread: 1,
                new: 0,
                last_seen_uid: Some(8),
            },
        );

        session.handle_line(
            "* STATUS \"INBOX.Lists\" (MESSAGES 4 UIDNEXT 11 UNSEEN 3)",
            &mut host,
            &mut agg,
            now,
        );

        assert_eq!(
            host.counts(&lists),
            MailboxCounts {
                total: 4,
                unread: 3,
                new: 2,
                last_seen_uid: Some(10),
            }
        );
        assert!(host.is_dirty(&lists));
    }

    #[test]
    fn test_status_new_never_negative() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();
        let lists = MailboxRef::new(AccountId::new("work"), "INBOX/Lists");
        host.set_counts(
            &lists,
            MailboxCounts {
                total: 9,
                unread: 5,
                new: 2,
                last_seen_uid: None,
            },
        );

        session.handle_line("* STATUS INBOX.Lists (UNSEEN 1)", &mut host, &mut agg, now);
        let counts = host.counts(&lists);
        assert_eq!(counts.unread, 1);
        assert_eq!(counts.new, 0);
        assert_eq!(counts.total, 9);
    }

    #[test]
    fn test_status_partial_parse_still_applies() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();
        let lists = MailboxRef::new(AccountId::new("work"), "INBOX/Lists");

        session.handle_line(
            "* STATUS INBOX.Lists (MESSAGES 6 HIGHESTMODSEQ 4 UNSEEN 2)",
            &mut host,
            &mut agg,
            now,
        );
        let counts = host.counts(&lists);
        assert_eq!(counts.total, 6);
        assert_eq!(counts.unread, 0);
    }

    #[test]
    fn test_status_for_unknown_mailbox_is_ignored() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        let disposition =
            session.handle_line("* STATUS Trash (MESSAGES 1)", &mut host, &mut agg, now);
        assert_eq!(disposition, Disposition::Keep);
        assert!(host.dirty().is_empty());
    }

    #[test]
    fn test_fetch_literal_builds_summary() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line(
            "* 5 FETCH (UID 42 BODY[HEADER.FIELDS (FROM SUBJECT)] {64}",
            &mut host,
            &mut agg,
            now,
        );
        assert!(session.pending_summary().is_some());

        session.handle_line("Subject: =?utf-8?Q?Caf=C3=A9?=", &mut host, &mut agg, now);
        assert_eq!(agg.batch().total(), 0);
        session.handle_line("From: Alice <alice@example.com>", &mut host, &mut agg, now);
        assert_eq!(agg.batch().total(), 0);

        session.handle_line("", &mut host, &mut agg, now);
        assert!(session.pending_summary().is_none());
        assert_eq!(
            agg.batch().summaries(),
            &[MessageSummary::with("Café", "Alice <alice@example.com>")]
        );

        session.handle_line(")", &mut host, &mut agg, now);
        assert_eq!(agg.batch().total(), 1);
    }

    #[test]
    fn test_folded_subject_is_unfolded() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        for line in [
            "* 7 FETCH (UID 70 BODY[HEADER.FIELDS (FROM SUBJECT)] {160}",
            "Subject: =?UTF-8?Q?Quarterly_r=C3=A9sum=C3=A9_for_the_whole_team?=",
            " =?UTF-8?Q?_and_the_board?=",
            "From: Carol <carol@example.com>",
            "\tvia list",
            ")",
        ] {
            session.handle_line(line, &mut host, &mut agg, now);
        }

        assert_eq!(
            agg.batch().summaries(),
            &[MessageSummary::with(
                "Quarterly résumé for the whole team and the board",
                "Carol <carol@example.com>\tvia list"
            )]
        );
    }

    #[test]
    fn test_continuation_outside_literal_is_ignored() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        assert_eq!(
            session.handle_line("  stray", &mut host, &mut agg, now),
            Disposition::Keep
        );
        assert!(agg.batch().is_empty());
    }

    #[test]
    fn test_literal_end_flushes_incomplete_summary() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line(
            "* 5 FETCH (BODY[HEADER.FIELDS (FROM SUBJECT)] {20}",
            &mut host,
            &mut agg,
            now,
        );
        session.handle_line("Subject: hello", &mut host, &mut agg, now);
        session.handle_line(")", &mut host, &mut agg, now);

        assert!(session.pending_summary().is_none());
        assert_eq!(agg.batch().total(), 1);
        assert_eq!(agg.batch().summaries()[0].from, None);
    }

    #[test]
    fn test_second_fetch_hands_off_previous_summary() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line("* 5 FETCH (BODY[] {20}", &mut host, &mut agg, now);
        session.handle_line("From: a@example.com", &mut host, &mut agg, now);
        session.handle_line("* 6 FETCH (BODY[] {20}", &mut host, &mut agg, now);

        assert_eq!(agg.batch().total(), 1);
        assert!(session.pending_summary().is_some());
    }

    #[test]
    fn test_headers_without_fetch_are_ignored() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        session.handle_line("From: a@example.com", &mut host, &mut agg, now);
        session.handle_line("Subject: stray", &mut host, &mut agg, now);
        assert!(agg.batch().is_empty());
    }

    #[test]
    fn test_unknown_tag_ignored() {
        let (mut session, _, now) = start(MonitorConfig::default());
        let mut host = host();
        let mut agg = Aggregator::default();

        assert_eq!(
            session.handle_line("A001 BAD what", &mut host, &mut agg, now),
            Disposition::Keep
        );
        assert_eq!(session.state(), SessionState::Negotiating);
    }
}
