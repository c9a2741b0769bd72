//! Monitor configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Interval between keepalive NOOPs and between IDLE refreshes.
///
/// Kept below the 30 minute inactivity timeout most servers enforce.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(29 * 60);

/// Tunables for monitor sessions and the notification aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Ask the server for From/Subject of new INBOX mail and show them.
    pub show_summaries: bool,
    /// NOOP interval while NOTIFY is active.
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,
    /// DONE/IDLE refresh interval in IDLE fallback.
    #[serde(with = "duration_secs")]
    pub idle_refresh_interval: Duration,
    /// Quiet period before a batch of summaries is shown.
    #[serde(with = "duration_millis")]
    pub debounce: Duration,
    /// Delay before the host redisplays a mailbox whose counts changed.
    #[serde(with = "duration_millis")]
    pub redisplay_delay: Duration,
    /// Delay between first mailbox access and the steal attempt.
    #[serde(with = "duration_millis")]
    pub steal_delay: Duration,
    /// Maximum summaries listed in one notification.
    pub max_summaries: usize,
    /// How long the notification stays on screen.
    #[serde(with = "duration_secs")]
    pub notification_duration: Duration,
    /// Show a short notification when NOTIFY is accepted.
    pub announce_ready: bool,
    /// Sound file played after a notification.
    pub sound: Option<PathBuf>,
    /// Command run after a notification; one `%d` is replaced by the count.
    pub command: Option<String>,
    /// First character of every command tag.
    pub tag_prefix: char,
    /// Server hierarchy delimiter translated to `/` for host lookups.
    pub hierarchy_delimiter: char,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            show_summaries: true,
            keepalive_interval: DEFAULT_KEEPALIVE,
            idle_refresh_interval: DEFAULT_KEEPALIVE,
            debounce: Duration::from_millis(80),
            redisplay_delay: Duration::from_millis(50),
            steal_delay: Duration::from_millis(10),
            max_summaries: 5,
            notification_duration: Duration::from_secs(10),
            announce_ready: false,
            sound: None,
            command: None,
            tag_prefix: 'N',
            hierarchy_delimiter: '.',
        }
    }
}

impl MonitorConfig {
    /// Sets whether summaries are requested and shown.
    #[must_use]
    pub const fn show_summaries(mut self, show: bool) -> Self {
        self.show_summaries = show;
        self
    }

    /// Sets the NOOP keepalive interval.
    #[must_use]
    pub const fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the IDLE refresh interval.
    #[must_use]
    pub const fn idle_refresh_interval(mut self, interval: Duration) -> Self {
        self.idle_refresh_interval = interval;
        self
    }

    /// Sets the notification debounce window.
    #[must_use]
    pub const fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the redisplay delay.
    #[must_use]
    pub const fn redisplay_delay(mut self, delay: Duration) -> Self {
        self.redisplay_delay = delay;
        self
    }

    /// Sets the steal delay.
    #[must_use]
    pub const fn steal_delay(mut self, delay: Duration) -> Self {
        self.steal_delay = delay;
        self
    }

    /// Sets the summary cap.
    #[must_use]
    pub const fn max_summaries(mut self, max: usize) -> Self {
        self.max_summaries = max;
        self
    }

    /// Enables the ready announcement.
    #[must_use]
    pub const fn announce_ready(mut self, announce: bool) -> Self {
        self.announce_ready = announce;
        self
    }

    /// Sets the sound played after a notification.
    #[must_use]
    pub fn sound(mut self, path: impl Into<PathBuf>) -> Self {
        self.sound = Some(path.into());
        self
    }

    /// Sets the command run after a notification.
    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Sets the server hierarchy delimiter.
    #[must_use]
    pub const fn hierarchy_delimiter(mut self, delimiter: char) -> Self {
        self.hierarchy_delimiter = delimiter;
        self
    }
}

/// Serde helpers for durations stored as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde with= signature
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Serde helpers for durations stored as milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde with= signature
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
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
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert!(config.show_summaries);
        assert_eq!(config.keepalive_interval, Duration::from_secs(1740));
        assert_eq!(config.idle_refresh_interval, Duration::from_secs(1740));
        assert_eq!(config.debounce, Duration::from_millis(80));
        assert_eq!(config.max_summaries, 5);
        assert_eq!(config.tag_prefix, 'N');
        assert_eq!(config.hierarchy_delimiter, '.');
    }

    #[test]
    fn test_builder() {
        let config = MonitorConfig::default()
            .show_summaries(false)
            .debounce(Duration::from_millis(20))
            .max_summaries(3)
            .command("notify %d");

        assert!(!config.show_summaries);
        assert_eq!(config.debounce, Duration::from_millis(20));
        assert_eq!(config.max_summaries, 3);
        assert_eq!(config.command.as_deref(), Some("notify %d"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"debounce": 120, "keepalive_interval": 600}"#).unwrap();
        assert_eq!(config.debounce, Duration::from_millis(120));
        assert_eq!(config.keepalive_interval, Duration::from_secs(600));
        assert_eq!(config.idle_refresh_interval, DEFAULT_KEEPALIVE);
        assert!(config.show_summaries);
    }

    #[test]
    fn test_serialize_durations_as_numbers() {
        let json = serde_json::to_value(MonitorConfig::default()).unwrap();
        assert_eq!(json["debounce"], 80);
        assert_eq!(json["keepalive_interval"], 1740);
        assert_eq!(json["notification_duration"], 10);
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = MonitorConfig::default().sound("/usr/share/sounds/new.oga");
        let json = serde_json::to_string(&config).unwrap();
        let back: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
