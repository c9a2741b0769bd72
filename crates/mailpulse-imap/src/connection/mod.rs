//! IMAP connections for the host side of the monitor.
//!
//! The monitor core never touches a socket. This module is what a host uses to
//! open the connections it lends out:
//! - Configuration (host, port, security mode)
//! - TLS/plaintext stream abstraction
//! - Line framing
//! - Greeting, STARTTLS and LOGIN
//! - [`StreamTransport`], the [`Transport`](crate::host::Transport) a session
//!   drives once the connection has been stolen

mod client;
mod config;
mod framed;
mod stream;
mod transport;

pub use client::{Greeting, login, open_authenticated, read_greeting};
pub use config::{Config, ConfigBuilder, Security};
pub use framed::{FramedStream, LineReader, write_line};
pub use stream::{ImapStream, connect, tls_connector};
pub use transport::StreamTransport;
