//! Settings file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use mailpulse_imap::{MonitorConfig, Security};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "MAILPULSE_CONFIG";

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Accounts to monitor.
    pub accounts: Vec<AccountSettings>,
    /// How often the mail check runs.
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,
    /// Program used to play the notification sound.
    pub sound_player: String,
    /// Monitor behaviour.
    pub monitor: MonitorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            check_interval: Duration::from_secs(5 * 60),
            sound_player: "paplay".to_string(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// One IMAP account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    /// Unique account name; also the keyring key.
    pub name: String,
    /// IMAP server hostname.
    pub host: String,
    /// Port; defaults from `security`.
    #[serde(default)]
    pub port: Option<u16>,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Login name.
    pub username: String,
    /// Password. Read from the keyring when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Mailboxes whose counters are tracked, `/`-separated.
    #[serde(default = "default_mailboxes")]
    pub mailboxes: Vec<String>,
}

fn default_mailboxes() -> Vec<String> {
    vec!["INBOX".to_string()]
}

impl Settings {
    /// Settings file location.
    pub fn path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailpulse")
            .join("settings.json")
    }

    /// Loads and validates the settings at `path`.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let settings = Self::parse(&contents).with_context(|| format!("in {}", path.display()))?;
        tracing::info!("Settings loaded from {:?}", path);
        Ok(settings)
    }

    /// Parses and validates settings JSON.
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let settings: Self = serde_json::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.accounts.is_empty() {
            bail!("no accounts configured");
        }
        for (i, account) in self.accounts.iter().enumerate() {
            if self.accounts[..i].iter().any(|a| a.name == account.name) {
                bail!("duplicate account name {:?}", account.name);
            }
        }
        if self.check_interval.is_zero() {
            bail!("check_interval must be positive");
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "accounts": [
            {
                "name": "work",
                "host": "imap.example.com",
                "security": "starttls",
                "username": "me@example.com",
                "mailboxes": ["INBOX", "Lists/rust"]
            },
            {
                "name": "home",
                "host": "mail.example.org",
                "username": "me",
                "password": "hunter2"
            }
        ],
        "check_interval": 120,
        "monitor": { "max_summaries": 3, "command": "notify-count %d" }
    }"#;

    #[test]
    fn test_parse_sample() {
        let settings = Settings::parse(SAMPLE).unwrap();
        assert_eq!(settings.accounts.len(), 2);
        assert_eq!(settings.check_interval, Duration::from_secs(120));
        assert_eq!(settings.sound_player, "paplay");

        let work = &settings.accounts[0];
        assert_eq!(work.security, Security::StartTls);
        assert_eq!(work.port, None);
        assert_eq!(work.password, None);
        assert_eq!(work.mailboxes, vec!["INBOX", "Lists/rust"]);

        let home = &settings.accounts[1];
        assert_eq!(home.security, Security::Implicit);
        assert_eq!(home.password.as_deref(), Some("hunter2"));
        assert_eq!(home.mailboxes, vec!["INBOX"]);

        assert_eq!(settings.monitor.max_summaries, 3);
        assert!(settings.monitor.show_summaries);
        assert_eq!(settings.monitor.command.as_deref(), Some("notify-count %d"));
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(Settings::parse("{}").is_err());

        let duplicate = r#"{"accounts": [
            {"name": "a", "host": "h", "username": "u"},
            {"name": "a", "host": "h2", "username": "u"}
        ]}"#;
        let err = Settings::parse(duplicate).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_password_not_serialized_when_absent() {
        let settings = Settings::parse(SAMPLE).unwrap();
        let json = serde_json::to_string(&settings.accounts[0]).unwrap();
        assert!(!json.contains("password"));
    }
}
