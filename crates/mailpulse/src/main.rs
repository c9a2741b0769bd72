//! `mailpulse` - desktop new-mail notifier.
//!
//! Keeps one authenticated connection per configured IMAP account, lends it to
//! the monitor, and pops up a notification when new mail arrives.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod credentials;
mod host;
mod notifier;
mod pool;
mod settings;

use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mailpulse_imap::connection::{Config, open_authenticated};
use mailpulse_imap::{AccountId, Monitor, MonitorHandle, monitor};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use host::DesktopHost;
use notifier::DesktopNotifier;
use pool::{Pool, SharedPool, lock};
use settings::{AccountSettings, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailpulse=info,mailpulse_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => {}
        Some("store-password") => {
            let name = args
                .next()
                .context("usage: mailpulse store-password <account>")?;
            return store_password(&name);
        }
        Some(other) => anyhow::bail!("unknown command {other:?}"),
    }

    info!("Starting mailpulse");

    let settings = Settings::load(&Settings::path()).await?;
    let accounts = settings
        .accounts
        .iter()
        .map(Account::resolve)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (handle, events) = monitor::channel();
    let pool: SharedPool = Pool::shared();
    let host = DesktopHost::new(
        settings
            .accounts
            .iter()
            .map(|a| (AccountId::new(&a.name), a.mailboxes.clone())),
        Arc::clone(&pool),
        handle.clone(),
    );
    let notifier = DesktopNotifier::new(&settings.sound_player);
    let monitor = tokio::spawn(Monitor::new(host, notifier, settings.monitor).run(events));

    let checker = tokio::spawn(check_loop(
        accounts,
        pool,
        handle.clone(),
        settings.check_interval,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");

    checker.abort();
    handle.shutdown();
    monitor.await.context("monitor task failed")?;
    Ok(())
}

/// An account with its password resolved.
struct Account {
    id: AccountId,
    config: Config,
    username: String,
    password: String,
}

impl Account {
    fn resolve(settings: &AccountSettings) -> anyhow::Result<Self> {
        let config = Config::builder(&settings.host)
            .security(settings.security)
            .port_opt(settings.port)
            .build();
        Ok(Self {
            id: AccountId::new(&settings.name),
            config,
            username: settings.username.clone(),
            password: credentials::password(settings)?,
        })
    }
}

/// Runs a mail check every `interval` until the monitor stops.
async fn check_loop(
    accounts: Vec<Account>,
    pool: SharedPool,
    events: MonitorHandle,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut listed = HashSet::new();

    while !events.is_closed() {
        ticker.tick().await;
        check_mail(&accounts, &pool, &events, &mut listed).await;
    }
}

/// Reopens dead or missing connections, then tells the monitor.
///
/// The first connection an account gets counts as its mailboxes being listed.
async fn check_mail(
    accounts: &[Account],
    pool: &SharedPool,
    events: &MonitorHandle,
    listed: &mut HashSet<AccountId>,
) {
    lock(pool).set_checking(true);

    for account in accounts {
        if !lock(pool).needs_connection(&account.id) {
            continue;
        }
        lock(pool).begin_open(&account.id);

        let opened =
            match open_authenticated(&account.config, &account.username, &account.password).await
            {
                Ok(stream) => {
                    info!(account = %account.id, host = %account.config.host, "connected");
                    Some(stream)
                }
                Err(e) => {
                    warn!(account = %account.id, error = %e, "connection failed");
                    None
                }
            };
        let first = opened.is_some() && listed.insert(account.id.clone());
        lock(pool).finish_open(&account.id, opened);

        if first {
            events.mailbox_listed(account.id.clone());
        }
    }

    lock(pool).set_checking(false);
    events.mail_check_finished();
}

/// Reads a password from stdin into the keyring.
fn store_password(account: &str) -> anyhow::Result<()> {
    eprint!("Password for {account}: ");
    let mut password = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut password)
        .context("reading password")?;
    credentials::store_password(account, password.trim_end_matches(['\r', '\n']))?;
    info!("Password stored for {account}");
    Ok(())
}
