//! # mailpulse-imap
//!
//! Background new-mail monitoring for IMAP accounts. Each account's idle
//! pooled connection is stolen and turned into a long-lived monitor that
//! subscribes to server-pushed events with NOTIFY (RFC 5465), falling back to
//! IDLE (RFC 2177) when the server refuses NOTIFY.
//!
//! ## Features
//!
//! - **NOTIFY with IDLE fallback**: One tagged exchange decides the mode; no
//!   capability probing
//! - **Connection stealing**: Sessions take over connections the host is not
//!   using and give up cleanly on end of stream
//! - **Debounced notifications**: Bursts of new mail collapse into one
//!   notification listing up to a configurable number of summaries
//! - **Sans-I/O core**: Sessions, the registry and the aggregator are driven
//!   by lines and deadlines; only [`connection`] touches sockets
//! - **TLS via rustls**: Secure connections without OpenSSL dependency
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailpulse_imap::{LoggingNotifier, Monitor, MonitorConfig, monitor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let host = MyHost::new(); // implements MailboxHost
//!     let (handle, events) = monitor::channel();
//!
//!     let monitor = Monitor::new(host, LoggingNotifier, MonitorConfig::default());
//!     let task = tokio::spawn(monitor.run(events));
//!
//!     // After each mail check:
//!     handle.mail_check_finished();
//!
//!     handle.shutdown();
//!     let (_host, _notifier) = task.await.unwrap();
//! }
//! ```
//!
//! ## Session Lifecycle
//!
//! ```text
//! ┌─────────────┐  NOTIFY OK   ┌──────────────────┐
//! │ Negotiating │ ───────────→ │  Active(Notify)  │
//! └─────────────┘              └──────────────────┘
//!        │ NOTIFY BAD/NO
//!        ▼
//! ┌──────────────────────┐  IDLE BAD/NO  ┌─────────────────────────┐
//! │ Active(IdleFallback) │ ────────────→ │ Terminated(Unsupported) │
//! └──────────────────────┘               └─────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`monitor`]: Sessions, the session registry and the dispatcher loop
//! - [`aggregator`]: Debounced notification batching
//! - [`host`]: Traits the embedding application implements
//! - [`parser`]: Line classification and STATUS decoding
//! - [`command`]: The commands the monitor issues, and their tags
//! - [`connection`]: Opening, authenticating and lending real connections
//! - [`types`]: Identifiers and mailbox counters

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod aggregator;
pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod host;
pub mod monitor;
pub mod parser;
pub mod timer;
pub mod types;

pub use aggregator::{Aggregator, Notification, NotificationBatch};
pub use command::{Command, CommandTag, TagCycle};
pub use config::MonitorConfig;
pub use connection::{Config, ConfigBuilder, FramedStream, ImapStream, Security, StreamTransport};
pub use error::{Error, Result};
pub use host::{
    CollectingNotifier, LoggingNotifier, MailboxHost, Notifier, NotifierEvent, Transport,
};
pub use monitor::{Monitor, MonitorEvent, MonitorHandle, MonitorSession, SessionRegistry};
pub use types::{AccountId, ConnectionId, MailboxCounts, MailboxRef, MailboxStatus, MessageSummary};
