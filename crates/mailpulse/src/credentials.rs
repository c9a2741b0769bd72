//! IMAP passwords in the system keyring.
//!
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use anyhow::Context;
use keyring::Entry;

use crate::settings::AccountSettings;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailpulse";

fn entry(account: &str) -> keyring::Result<Entry> {
    Entry::new(SERVICE_NAME, &format!("{SERVICE_NAME}_imap_{account}"))
}

/// Stores an account's IMAP password.
pub fn store_password(account: &str, password: &str) -> anyhow::Result<()> {
    entry(account)?.set_password(password)?;
    tracing::debug!("Stored IMAP password for account {account}");
    Ok(())
}

/// Returns the password from the settings file, or else from the keyring.
pub fn password(account: &AccountSettings) -> anyhow::Result<String> {
    if let Some(password) = &account.password {
        return Ok(password.clone());
    }
    match entry(&account.name)?.get_password() {
        Ok(password) => Ok(password),
        Err(keyring::Error::NoEntry) => anyhow::bail!(
            "no password for account {:?}; run `mailpulse store-password {}`",
            account.name,
            account.name
        ),
        Err(e) => Err(e).with_context(|| format!("reading keyring for {:?}", account.name)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailpulse_imap::Security;

    #[test]
    fn test_inline_password_skips_keyring() {
        let account = AccountSettings {
            name: "home".to_string(),
            host: "mail.example.org".to_string(),
            port: None,
            security: Security::Implicit,
            username: "me".to_string(),
            password: Some("hunter2".to_string()),
            mailboxes: vec!["INBOX".to_string()],
        };
        assert_eq!(password(&account).unwrap(), "hunter2");
    }
}
