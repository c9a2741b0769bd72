//! Interfaces between the monitor and the application embedding it.
//!
//! The monitor owns no mail model, no sockets, and no UI. It drives three
//! collaborators supplied by the host application:
//!
//! - [`Transport`]: the write half of a stolen connection
//! - [`MailboxHost`]: accounts, the connection pool, and mailbox counters
//! - [`Notifier`]: notification display, sound, and command execution
//!
//! Inbound lines travel the other way, as
//! [`MonitorEvent::Line`](crate::monitor::MonitorEvent::Line) on the
//! dispatcher's channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;
use crate::types::{AccountId, ConnectionId, MailboxCounts, MailboxRef};

/// Outbound side of a connection owned by a monitor session.
pub trait Transport {
    /// Identity stamped on every line this connection delivers.
    fn id(&self) -> ConnectionId;

    /// Queues one protocol line for sending. The CRLF is appended by the
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`](crate::Error::TransportClosed) once
    /// the connection is gone.
    fn send(&mut self, line: &str) -> Result<()>;

    /// Returns true once the read side has reached end of stream.
    fn is_eof(&self) -> bool;

    /// Tears the connection down. Further sends fail.
    fn close(&mut self);
}

/// The host application's account and mailbox model.
pub trait MailboxHost {
    /// Connection type handed over by [`acquire_idle_connection`](Self::acquire_idle_connection).
    type Connection: Transport;

    /// Every IMAP account the host knows about.
    fn imap_accounts(&self) -> Vec<AccountId>;

    /// Returns true while the host cannot give up a connection at all, such as
    /// during a mail check.
    fn is_busy(&self) -> bool {
        false
    }

    /// Returns true if the account's pooled connection has a command in flight.
    fn is_connection_busy(&self, account: &AccountId) -> bool;

    /// Detaches the account's idle pooled connection. The pool must not use it
    /// afterwards.
    fn acquire_idle_connection(&mut self, account: &AccountId) -> Option<Self::Connection>;

    /// Resolves a `/`-separated path to a host mailbox.
    fn lookup_mailbox(&self, account: &AccountId, path: &str) -> Option<MailboxRef>;

    /// Current cached counters of a mailbox.
    fn mailbox_counts(&self, mailbox: &MailboxRef) -> MailboxCounts;

    /// Replaces the cached counters of a mailbox.
    fn update_mailbox_counts(&mut self, mailbox: &MailboxRef, counts: MailboxCounts);

    /// Flags a mailbox as changed since the host last synchronized it.
    fn mark_mailbox_dirty(&mut self, mailbox: &MailboxRef);

    /// Redraws a mailbox whose counters changed.
    fn redisplay_mailbox(&mut self, mailbox: &MailboxRef);
}

/// User-facing new-mail signals.
pub trait Notifier {
    /// Shows a notification for `duration`. `body` may contain `<b>` markup.
    fn display_notification(&mut self, title: &str, body: &str, duration: Duration);

    /// Plays a sound file.
    fn play_sound(&mut self, path: &Path);

    /// Runs a shell command line.
    fn run_command(&mut self, command: &str);
}

/// A notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn display_notification(&mut self, title: &str, body: &str, duration: Duration) {
        tracing::info!(title, body, ?duration, "notification");
    }

    fn play_sound(&mut self, path: &Path) {
        tracing::info!(path = %path.display(), "sound");
    }

    fn run_command(&mut self, command: &str) {
        tracing::info!(command, "command");
    }
}

/// A notifier that records every call.
///
/// Useful for testing.
#[derive(Debug, Default, Clone)]
pub struct CollectingNotifier {
    /// Recorded calls.
    pub events: Vec<NotifierEvent>,
}

impl CollectingNotifier {
    /// Creates an empty collecting notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all recorded calls, leaving the notifier empty.
    pub fn take(&mut self) -> Vec<NotifierEvent> {
        std::mem::take(&mut self.events)
    }

    /// Recorded notifications only.
    pub fn notifications(&self) -> impl Iterator<Item = (&str, &str)> {
        self.events.iter().filter_map(|event| match event {
            NotifierEvent::Notification { title, body, .. } => {
                Some((title.as_str(), body.as_str()))
            }
            _ => None,
        })
    }
}

impl Notifier for CollectingNotifier {
    fn display_notification(&mut self, title: &str, body: &str, duration: Duration) {
        self.events.push(NotifierEvent::Notification {
            title: title.to_string(),
            body: body.to_string(),
            duration,
        });
    }

    fn play_sound(&mut self, path: &Path) {
        self.events.push(NotifierEvent::Sound(path.to_path_buf()));
    }

    fn run_command(&mut self, command: &str) {
        self.events.push(NotifierEvent::Command(command.to_string()));
    }
}

/// A call recorded by [`CollectingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    /// `display_notification`.
    Notification {
        /// Title.
        title: String,
        /// Markup body.
        body: String,
        /// Display duration.
        duration: Duration,
    },
    /// `play_sound`.
    Sound(PathBuf),
    /// `run_command`.
    Command(String),
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
    fn test_logging_notifier() {
        let mut notifier = LoggingNotifier;
        // Should not panic
        notifier.display_notification("1 new message", "<b>Hi</b>  bob", Duration::from_secs(10));
        notifier.play_sound(Path::new("/tmp/ding.oga"));
        notifier.run_command("true");
    }

    #[test]
    fn test_collecting_notifier() {
        let mut notifier = CollectingNotifier::new();
        notifier.display_notification("2 new messages", "body", Duration::from_secs(10));
        notifier.play_sound(Path::new("/tmp/ding.oga"));
        notifier.run_command("echo 2");

        assert_eq!(notifier.events.len(), 3);
        assert_eq!(
            notifier.notifications().collect::<Vec<_>>(),
            vec![("2 new messages", "body")]
        );
        assert_eq!(
            notifier.events[1],
            NotifierEvent::Sound(PathBuf::from("/tmp/ding.oga"))
        );
        assert_eq!(notifier.events[2], NotifierEvent::Command("echo 2".to_string()));

        let taken = notifier.take();
        assert_eq!(taken.len(), 3);
        assert!(notifier.events.is_empty());
    }
}
