//! Integration tests for the monitor.
//!
//! The scripted tests drive a [`Monitor`] by hand with a recording transport
//! and an in-memory host. The last test runs the real event loop over a
//! [`StreamTransport`] connected to an in-process peer.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::Instant;

use mailpulse_imap::connection::FramedStream;
use mailpulse_imap::host::NotifierEvent;
use mailpulse_imap::monitor::{self, Mode, SessionState, Termination};
use mailpulse_imap::{
    AccountId, CollectingNotifier, ConnectionId, Error, MailboxCounts, MailboxHost, MailboxRef,
    Monitor, MonitorConfig, MonitorEvent, Result, StreamTransport, Transport,
};

const MS: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct Wire {
    sent: Vec<String>,
    closed: bool,
}

/// Records outbound lines.
#[derive(Debug, Clone)]
struct Recorder {
    id: ConnectionId,
    wire: Arc<Mutex<Wire>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            id: ConnectionId::next(),
            wire: Arc::default(),
        }
    }

    fn sent(&self) -> Vec<String> {
        self.wire.lock().unwrap().sent.clone()
    }

    fn closed(&self) -> bool {
        self.wire.lock().unwrap().closed
    }
}

impl Transport for Recorder {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&mut self, line: &str) -> Result<()> {
        let mut wire = self.wire.lock().unwrap();
        if wire.closed {
            return Err(Error::TransportClosed);
        }
        wire.sent.push(line.to_string());
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.wire.lock().unwrap().closed
    }

    fn close(&mut self) {
        self.wire.lock().unwrap().closed = true;
    }
}

/// A host with one account, `work`, whose mailboxes are `INBOX` and
/// `Lists/rust`.
#[derive(Debug)]
struct Desk<C> {
    idle: Option<C>,
    busy: bool,
    connection_busy: bool,
    counts: BTreeMap<MailboxRef, MailboxCounts>,
    dirty: BTreeSet<MailboxRef>,
    redisplayed: Vec<MailboxRef>,
}

impl<C> Desk<C> {
    fn new(idle: Option<C>) -> Self {
        Self {
            idle,
            busy: false,
            connection_busy: false,
            counts: BTreeMap::new(),
            dirty: BTreeSet::new(),
            redisplayed: Vec::new(),
        }
    }

    fn counts(&self, path: &str) -> MailboxCounts {
        self.counts.get(&mailbox(path)).copied().unwrap_or_default()
    }
}

impl<C: Transport> MailboxHost for Desk<C> {
    type Connection = C;

    fn imap_accounts(&self) -> Vec<AccountId> {
        vec![work()]
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn is_connection_busy(&self, _account: &AccountId) -> bool {
        self.connection_busy
    }

    fn acquire_idle_connection(&mut self, _account: &AccountId) -> Option<C> {
        self.idle.take()
    }

    fn lookup_mailbox(&self, account: &AccountId, path: &str) -> Option<MailboxRef> {
        ["INBOX", "Lists/rust"]
            .contains(&path)
            .then(|| MailboxRef::new(account.clone(), path))
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
        self.redisplayed.push(mailbox.clone());
    }
}

fn work() -> AccountId {
    AccountId::new("work")
}

fn mailbox(path: &str) -> MailboxRef {
    MailboxRef::new(work(), path)
}

type Scripted = Monitor<Desk<Recorder>, CollectingNotifier>;

fn scripted(config: MonitorConfig) -> (Scripted, Recorder) {
    let recorder = Recorder::new();
    let host = Desk::new(Some(recorder.clone()));
    (Monitor::new(host, CollectingNotifier::new(), config), recorder)
}

fn feed(monitor: &mut Scripted, recorder: &Recorder, lines: &[&str], now: Instant) {
    for text in lines {
        let event = MonitorEvent::Line {
            account: work(),
            connection: recorder.id(),
            line: (*text).to_string(),
        };
        assert!(monitor.handle_event(event, now).is_continue());
    }
}

fn new_message(n: u32) -> Vec<String> {
    vec![
        format!("* {n} FETCH (UID {n} BODY[HEADER.FIELDS (FROM SUBJECT)] {{64}}"),
        format!("From: sender{n}@example.com"),
        format!("Subject: message {n}"),
        String::new(),
        ")".to_string(),
    ]
}

fn feed_message(monitor: &mut Scripted, recorder: &Recorder, n: u32, now: Instant) {
    let lines = new_message(n);
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    feed(monitor, recorder, &lines, now);
}

fn notifications(monitor: &Scripted) -> Vec<(String, String)> {
    monitor
        .notifier()
        .notifications()
        .map(|(title, body)| (title.to_string(), body.to_string()))
        .collect()
}

fn stolen(config: MonitorConfig) -> (Scripted, Recorder, Instant) {
    let (mut monitor, recorder) = scripted(config);
    let now = Instant::now();
    let _ = monitor.handle_event(MonitorEvent::MailCheckFinished, now);
    assert!(monitor.registry().contains(&work()));
    (monitor, recorder, now)
}

#[test]
fn test_steal_sends_select_and_notify() {
    let (_monitor, recorder, _now) = stolen(MonitorConfig::default());
    let sent = recorder.sent();
    assert_eq!(sent[0], "N0001 SELECT INBOX");
    assert!(sent[1].starts_with("N0002 NOTIFY SET (selected"));
}

#[test]
fn test_steal_without_summaries_closes_mailbox() {
    let (_monitor, recorder, _now) = stolen(MonitorConfig::default().show_summaries(false));
    assert_eq!(
        recorder.sent(),
        vec!["N0001 CLOSE", "N0002 NOTIFY SET (inboxes (MessageNew))"]
    );
}

#[test]
fn test_busy_connection_is_not_stolen() {
    let (mut monitor, recorder) = scripted(MonitorConfig::default());
    monitor.host_mut().connection_busy = true;

    let _ = monitor.handle_event(MonitorEvent::MailCheckFinished, Instant::now());

    assert!(monitor.registry().is_empty());
    assert!(recorder.sent().is_empty());
    assert!(monitor.host().idle.is_some());
}

#[test]
fn test_status_updates_counts_and_redisplays_once() {
    let (mut monitor, recorder, now) = stolen(MonitorConfig::default());
    feed(&mut monitor, &recorder, &["N0002 OK NOTIFY done"], now);

    feed(
        &mut monitor,
        &recorder,
        &[
            "* STATUS Lists.rust (MESSAGES 12 UNSEEN 3 UIDNEXT 40)",
            "* STATUS Lists.rust (UNSEEN 4)",
            "* STATUS Unknown (MESSAGES 1)",
        ],
        now,
    );

    let counts = monitor.host().counts("Lists/rust");
    assert_eq!(counts.total, 12);
    assert_eq!(counts.unread, 4);
    assert_eq!(counts.new, 1);
    assert_eq!(counts.last_seen_uid, Some(39));
    assert!(monitor.host().dirty.contains(&mailbox("Lists/rust")));

    monitor.fire_timers(now + 100 * MS);
    assert_eq!(monitor.host().redisplayed, vec![mailbox("Lists/rust")]);
}

#[test]
fn test_exists_and_recent_update_inbox() {
    let (mut monitor, recorder, now) = stolen(MonitorConfig::default());
    feed(
        &mut monitor,
        &recorder,
        &["N0002 OK NOTIFY done", "* 8 EXISTS", "* 2 RECENT"],
        now,
    );

    let counts = monitor.host().counts("INBOX");
    assert_eq!(counts.total, 8);
    assert_eq!(counts.new, 2);
    assert_eq!(counts.unread, 2);
}

#[test]
fn test_burst_is_capped_but_counted() {
    let (mut monitor, recorder, now) = stolen(MonitorConfig::default());
    feed(&mut monitor, &recorder, &["N0002 OK NOTIFY done"], now);

    for n in 1..=7 {
        feed_message(&mut monitor, &recorder, n, now);
    }
    assert_eq!(monitor.aggregator().batch().total(), 7);
    assert_eq!(monitor.aggregator().batch().summaries().len(), 5);

    monitor.fire_timers(now + 100 * MS);

    let shown = notifications(&monitor);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, "7 new messages");
    assert_eq!(shown[0].1.lines().count(), 5);
    assert!(shown[0].1.starts_with("<b>message 1</b>  sender1@example.com"));
}

#[test]
fn test_debounce_collapses_spaced_arrivals() {
    let (mut monitor, recorder, start) = stolen(MonitorConfig::default());
    feed(&mut monitor, &recorder, &["N0002 OK NOTIFY done"], start);

    for (n, offset) in [(1, 0), (2, 30), (3, 60)] {
        let now = start + offset * MS;
        feed_message(&mut monitor, &recorder, n, now);
        monitor.fire_timers(now);
    }
    assert!(notifications(&monitor).is_empty());

    monitor.fire_timers(start + 139 * MS);
    assert!(notifications(&monitor).is_empty());

    monitor.fire_timers(start + 140 * MS);
    let shown = notifications(&monitor);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0, "3 new messages");
}

#[test]
fn test_sound_and_command_follow_notification() {
    let config = MonitorConfig::default()
        .sound("/usr/share/sounds/ding.oga")
        .command("notify-count %d");
    let (mut monitor, recorder, now) = stolen(config);
    feed(&mut monitor, &recorder, &["N0002 OK NOTIFY done"], now);
    feed_message(&mut monitor, &recorder, 1, now);

    monitor.fire_timers(now + 100 * MS);

    let events = &monitor.notifier().events;
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[0],
        NotifierEvent::Notification { title, .. } if title == "1 new message"
    ));
    assert!(matches!(&events[1], NotifierEvent::Sound(_)));
    assert_eq!(events[2], NotifierEvent::Command("notify-count 1".to_string()));
}

#[test]
fn test_notify_rejected_falls_back_to_idle() {
    let config = MonitorConfig::default().idle_refresh_interval(Duration::from_secs(60));
    let (mut monitor, recorder, now) = stolen(config);

    feed(&mut monitor, &recorder, &["N0002 BAD unknown command NOTIFY"], now);

    let session = monitor.registry().get(&work()).unwrap();
    assert_eq!(session.mode(), Some(Mode::IdleFallback));
    assert_eq!(&recorder.sent()[2..], ["N0004 SELECT INBOX", "N0005 IDLE"]);

    monitor.fire_timers(now + Duration::from_secs(60));
    assert_eq!(recorder.sent().last().unwrap(), "DONE");

    feed(&mut monitor, &recorder, &["N0005 OK IDLE terminated"], now);
    assert_eq!(recorder.sent().last().unwrap(), "N0005 IDLE");
}

#[test]
fn test_idle_rejected_marks_account_unsupported() {
    let (mut monitor, recorder, now) = stolen(MonitorConfig::default());

    feed(
        &mut monitor,
        &recorder,
        &["N0002 NO not here", "N0005 BAD IDLE not supported"],
        now,
    );

    let session = monitor.registry().get(&work()).unwrap();
    assert_eq!(
        session.state(),
        SessionState::Terminated(Termination::Unsupported)
    );
    assert!(recorder.closed());
    assert_eq!(monitor.next_deadline(), None);

    // The unsupported record stays, so later mail checks do not retry.
    let _ = monitor.handle_event(MonitorEvent::MailCheckFinished, now);
    assert!(monitor.registry().contains(&work()));
}

#[test]
fn test_bye_destroys_session() {
    let (mut monitor, recorder, now) = stolen(MonitorConfig::default());
    feed(
        &mut monitor,
        &recorder,
        &["N0002 OK NOTIFY done", "* BYE server shutting down"],
        now,
    );

    assert!(monitor.registry().is_empty());
    assert!(recorder.closed());
    assert_eq!(monitor.registry().next_deadline(), None);
}

#[test]
fn test_lines_from_stale_connection_are_ignored() {
    let (mut monitor, recorder, now) = stolen(MonitorConfig::default());
    let event = MonitorEvent::Line {
        account: work(),
        connection: ConnectionId::next(),
        line: "* BYE not yours".to_string(),
    };

    let _ = monitor.handle_event(event, now);

    assert!(monitor.registry().contains(&work()));
    assert!(!recorder.closed());
}

#[test]
fn test_shutdown_discards_pending_batch() {
    let (mut monitor, recorder, now) = stolen(MonitorConfig::default());
    feed(&mut monitor, &recorder, &["N0002 OK NOTIFY done"], now);
    feed_message(&mut monitor, &recorder, 1, now);

    assert!(monitor.handle_event(MonitorEvent::Shutdown, now).is_break());
    monitor.shutdown();

    assert!(monitor.registry().is_empty());
    assert!(monitor.aggregator().batch().is_empty());
    assert!(notifications(&monitor).is_empty());
}

#[tokio::test]
async fn test_event_loop_over_stream_transport() {
    let (local, remote) = tokio::io::duplex(4096);
    let (handle, events) = monitor::channel();
    let transport = StreamTransport::spawn(FramedStream::new(local), work(), handle.clone());
    let host = Desk::new(Some(transport));
    let monitor = Monitor::new(host, CollectingNotifier::new(), MonitorConfig::default());
    let task = tokio::spawn(monitor.run(events));

    assert!(handle.mail_check_finished());

    let (read, mut write) = tokio::io::split(remote);
    let mut server = BufReader::new(read);
    let mut line = String::new();
    server.read_line(&mut line).await.unwrap();
    assert_eq!(line, "N0001 SELECT INBOX\r\n");
    line.clear();
    server.read_line(&mut line).await.unwrap();
    assert!(line.starts_with("N0002 NOTIFY SET"));

    let mut script = String::from("N0001 OK SELECT done\r\nN0002 OK NOTIFY done\r\n");
    for text in new_message(1) {
        script.push_str(&text);
        script.push_str("\r\n");
    }
    write.write_all(script.as_bytes()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(handle.shutdown());

    let (_host, notifier) = task.await.unwrap();
    let shown: Vec<_> = notifier.notifications().collect();
    assert_eq!(
        shown,
        vec![("1 new message", "<b>message 1</b>  sender1@example.com")]
    );
}
