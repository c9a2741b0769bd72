//! The single event loop that drives every session.
//!
//! Inbound lines, connection closes, and host triggers arrive on one channel;
//! timers are the deadlines owned by the sessions, the registry, and the
//! aggregator. [`Monitor::run`] waits for whichever comes first and handles
//! it to completion before looking at the next, so no two events ever
//! interleave.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::registry::SessionRegistry;
use super::session::Disposition;
use crate::aggregator::{Aggregator, Notification, render_command};
use crate::config::MonitorConfig;
use crate::host::{MailboxHost, Notifier};
use crate::timer::earliest;
use crate::types::{AccountId, ConnectionId};

/// How long the ready announcement stays on screen.
const READY_DURATION: Duration = Duration::from_secs(2);

/// An event for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A line arrived on a monitored connection.
    Line {
        /// Account the connection belongs to.
        account: AccountId,
        /// Connection that produced the line.
        connection: ConnectionId,
        /// The line, without CRLF.
        line: String,
    },
    /// A monitored connection reached end of stream.
    Closed {
        /// Account the connection belongs to.
        account: AccountId,
        /// Connection that closed.
        connection: ConnectionId,
    },
    /// The host finished a mail check.
    MailCheckFinished,
    /// The host listed an account's mailboxes for the first time.
    MailboxListed {
        /// The account.
        account: AccountId,
    },
    /// Stop monitoring and return.
    Shutdown,
}

/// Cloneable sender side of the dispatcher's channel.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    sender: mpsc::UnboundedSender<MonitorEvent>,
}

impl MonitorHandle {
    /// Sends an event. Returns false once the monitor has stopped.
    pub fn send(&self, event: MonitorEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Reports a finished mail check.
    pub fn mail_check_finished(&self) -> bool {
        self.send(MonitorEvent::MailCheckFinished)
    }

    /// Reports that an account's mailboxes were listed.
    pub fn mailbox_listed(&self, account: AccountId) -> bool {
        self.send(MonitorEvent::MailboxListed { account })
    }

    /// Asks the monitor to shut down.
    pub fn shutdown(&self) -> bool {
        self.send(MonitorEvent::Shutdown)
    }

    /// Returns true once the monitor has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving side of the dispatcher's channel.
pub type MonitorEvents = mpsc::UnboundedReceiver<MonitorEvent>;

/// Creates the dispatcher's event channel.
#[must_use]
pub fn channel() -> (MonitorHandle, MonitorEvents) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (MonitorHandle { sender }, receiver)
}

/// Owns the registry, the aggregator, and the host collaborators.
pub struct Monitor<H: MailboxHost, N> {
    host: H,
    notifier: N,
    registry: SessionRegistry<H::Connection>,
    aggregator: Aggregator,
    config: Arc<MonitorConfig>,
}

impl<H, N> Monitor<H, N>
where
    H: MailboxHost,
    N: Notifier,
{
    /// Creates a monitor with no sessions.
    #[must_use]
    pub fn new(host: H, notifier: N, config: MonitorConfig) -> Self {
        let config = Arc::new(config);
        Self {
            host,
            notifier,
            registry: SessionRegistry::new(Arc::clone(&config)),
            aggregator: Aggregator::from_config(&config),
            config,
        }
    }

    /// The host model.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host model.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The notifier.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The session registry.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry<H::Connection> {
        &self.registry
    }

    /// The notification aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Runs until [`MonitorEvent::Shutdown`] arrives or every sender is gone.
    ///
    /// Returns the host and notifier after shutting down.
    pub async fn run(mut self, mut events: MonitorEvents) -> (H, N) {
        tracing::info!("monitor started");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle_event(event, Instant::now()).is_break() {
                        break;
                    }
                }
                () = sleep_until(deadline) => self.fire_timers(Instant::now()),
            }
        }
        self.shutdown();
        (self.host, self.notifier)
    }

    /// Handles one event.
    pub fn handle_event(&mut self, event: MonitorEvent, now: Instant) -> ControlFlow<()> {
        match event {
            MonitorEvent::Line {
                account,
                connection,
                line,
            } => {
                let disposition = self.registry.handle_line(
                    &account,
                    connection,
                    &line,
                    &mut self.host,
                    &mut self.aggregator,
                    now,
                );
                if disposition == Disposition::Ready && self.config.announce_ready {
                    self.notifier
                        .display_notification("IMAP NOTIFY", "ready", READY_DURATION);
                }
            }
            MonitorEvent::Closed {
                account,
                connection,
            } => self.registry.connection_closed(&account, connection),
            MonitorEvent::MailCheckFinished => {
                self.registry.on_mail_check_finished(&mut self.host);
            }
            MonitorEvent::MailboxListed { account } => {
                self.registry.schedule_steal(&account, now);
            }
            MonitorEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Fires every timer that is due.
    pub fn fire_timers(&mut self, now: Instant) {
        self.registry.on_timers(&mut self.host, now);
        if let Some(notification) = self.aggregator.poll(now) {
            self.deliver(&notification);
        }
    }

    /// Earliest deadline of any timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.registry.next_deadline(), self.aggregator.deadline()])
    }

    /// Discards the pending batch and destroys every session.
    pub fn shutdown(&mut self) {
        self.aggregator.discard();
        self.registry.shutdown();
        tracing::info!("monitor stopped");
    }

    fn deliver(&mut self, notification: &Notification) {
        tracing::info!(count = notification.count, "new mail");
        self.notifier.display_notification(
            &notification.title,
            &notification.body,
            self.config.notification_duration,
        );
        if let Some(sound) = &self.config.sound {
            self.notifier.play_sound(sound);
        }
        if let Some(template) = &self.config.command {
            self.notifier
                .run_command(&render_command(template, notification.count));
        }
    }
}

impl<H: MailboxHost, N> std::fmt::Debug for Monitor<H, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("registry", &self.registry)
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
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
    use crate::host::{CollectingNotifier, NotifierEvent, Transport};
    use crate::monitor::testing::{MockHost, MockTransport};

    const MS: Duration = Duration::from_millis(1);

    fn work() -> AccountId {
        AccountId::new("work")
    }

    fn line(transport: &MockTransport, text: &str) -> MonitorEvent {
        MonitorEvent::Line {
            account: work(),
            connection: transport.id(),
            line: text.to_string(),
        }
    }

    fn monitor(config: MonitorConfig) -> (Monitor<MockHost, CollectingNotifier>, MockTransport) {
        let transport = MockTransport::new();
        let host = MockHost::new()
            .with_mailbox("work", "INBOX")
            .with_connection("work", transport.clone());
        (Monitor::new(host, CollectingNotifier::new(), config), transport)
    }

    fn fetch(
        monitor: &mut Monitor<MockHost, CollectingNotifier>,
        t: &MockTransport,
        n: u32,
        now: Instant,
    ) {
        let events = [
            format!("* {n} FETCH (UID {n} BODY[HEADER.FIELDS (FROM SUBJECT)] {{60}}"),
            format!("From: sender{n}@example.com"),
            format!("Subject: message {n}"),
            ")".to_string(),
        ];
        for text in events {
            assert!(monitor.handle_event(line(t, &text), now).is_continue());
        }
    }

    #[test]
    fn test_mail_check_then_notify_ready() {
        let config = MonitorConfig::default().announce_ready(true);
        let (mut monitor, transport) = monitor(config);
        let now = Instant::now();

        let _ = monitor.handle_event(MonitorEvent::MailCheckFinished, now);
        assert!(monitor.registry().contains(&work()));

        let _ = monitor.handle_event(line(&transport, "N0002 OK NOTIFY completed"), now);
        assert_eq!(
            monitor.notifier().events,
            vec![NotifierEvent::Notification {
                title: "IMAP NOTIFY".to_string(),
                body: "ready".to_string(),
                duration: READY_DURATION,
            }]
        );
    }

    #[test]
    fn test_burst_produces_one_notification() {
        let config = MonitorConfig::default()
            .sound("/tmp/new.oga")
            .command("mail-hook %d");
        let (mut monitor, transport) = monitor(config);
        let now = Instant::now();
        let _ = monitor.handle_event(MonitorEvent::MailCheckFinished, now);

        for n in 0..7 {
            fetch(&mut monitor, &transport, n, now + n * 10 * MS);
        }

        monitor.fire_timers(now + 100 * MS);
        assert!(monitor.notifier().events.is_empty());

        let deadline = monitor.aggregator().deadline().unwrap();
        assert_eq!(deadline, now + 140 * MS);
        monitor.fire_timers(deadline);

        let events = &monitor.notifier().events;
        assert_eq!(events.len(), 3);
        match &events[0] {
            NotifierEvent::Notification { title, body, .. } => {
                assert_eq!(title, "7 new messages");
                assert_eq!(body.lines().count(), 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events[1], NotifierEvent::Sound("/tmp/new.oga".into()));
        assert_eq!(events[2], NotifierEvent::Command("mail-hook 7".to_string()));
    }

    #[test]
    fn test_shutdown_discards_pending_batch() {
        let (mut monitor, transport) = monitor(MonitorConfig::default());
        let now = Instant::now();
        let _ = monitor.handle_event(MonitorEvent::MailCheckFinished, now);
        fetch(&mut monitor, &transport, 1, now);

        assert!(monitor.handle_event(MonitorEvent::Shutdown, now).is_break());
        monitor.shutdown();

        assert!(monitor.aggregator().batch().is_empty());
        assert!(monitor.registry().is_empty());
        assert!(transport.is_closed());
        assert_eq!(monitor.next_deadline(), None);
        assert!(monitor.notifier().events.is_empty());
    }

    #[test]
    fn test_mailbox_listed_defers_steal() {
        let (mut monitor, _) = monitor(MonitorConfig::default());
        let now = Instant::now();

        let _ = monitor.handle_event(MonitorEvent::MailboxListed { account: work() }, now);
        assert!(!monitor.registry().contains(&work()));
        assert_eq!(monitor.next_deadline(), Some(now + 10 * MS));

        monitor.fire_timers(now + 10 * MS);
        assert!(monitor.registry().contains(&work()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let (monitor, transport) = monitor(MonitorConfig::default());
        let (handle, events) = channel();

        let driver = async {
            handle.mail_check_finished();
            tokio::task::yield_now().await;
            handle.send(line(&transport, "N0002 OK NOTIFY completed"));
            handle.send(line(&transport, "* 3 FETCH (BODY[] {40}"));
            handle.send(line(&transport, "Subject: hello"));
            handle.send(line(&transport, "From: bob@example.com"));
            handle.send(line(&transport, ")"));
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.shutdown();
        };

        let ((host, notifier), ()) = tokio::join!(monitor.run(events), driver);

        assert_eq!(notifier.notifications().count(), 1);
        assert!(!host.has_connection(&work()));
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sends_keepalive() {
        let (monitor, transport) = monitor(MonitorConfig::default());
        let (handle, events) = channel();

        let driver = async {
            handle.mail_check_finished();
            handle.send(line(&transport, "N0002 OK"));
            tokio::time::sleep(Duration::from_secs(29 * 60 + 1)).await;
            handle.shutdown();
        };

        let _ = tokio::join!(monitor.run(events), driver);
        assert!(transport.sent().contains(&"N0003 NOOP".to_string()));
    }
}
