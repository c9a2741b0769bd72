//! Desktop notifications, sounds, and user commands.

use std::path::Path;
use std::time::Duration;

use mailpulse_imap::Notifier;
use notify_rust::{Notification, Timeout};

/// Application name shown by the notification daemon.
const APP_NAME: &str = "mailpulse";

/// [`Notifier`] backed by the desktop notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    sound_player: String,
}

impl DesktopNotifier {
    /// Creates a notifier that plays sounds with `sound_player`.
    pub fn new(sound_player: impl Into<String>) -> Self {
        Self {
            sound_player: sound_player.into(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn display_notification(&mut self, title: &str, body: &str, duration: Duration) {
        let mut notification = Notification::new();
        notification
            .appname(APP_NAME)
            .summary(title)
            .body(body)
            .icon("mail-unread")
            .timeout(timeout(duration));

        // Showing is a blocking round trip to the notification daemon.
        tokio::task::spawn_blocking(move || {
            if let Err(e) = notification.show() {
                tracing::warn!(error = %e, "failed to show notification");
            }
        });
    }

    fn play_sound(&mut self, path: &Path) {
        spawn(tokio::process::Command::new(&self.sound_player).arg(path));
    }

    fn run_command(&mut self, command: &str) {
        spawn(tokio::process::Command::new("sh").arg("-c").arg(command));
    }
}

fn timeout(duration: Duration) -> Timeout {
    u32::try_from(duration.as_millis()).map_or(Timeout::Default, Timeout::Milliseconds)
}

/// Starts a child without waiting for it; the runtime reaps it.
fn spawn(command: &mut tokio::process::Command) {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    if let Err(e) = command.kill_on_drop(false).spawn() {
        tracing::warn!(program, error = %e, "failed to start");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_in_milliseconds() {
        assert_eq!(timeout(Duration::from_secs(5)), Timeout::Milliseconds(5000));
        assert_eq!(timeout(Duration::MAX), Timeout::Default);
    }
}
