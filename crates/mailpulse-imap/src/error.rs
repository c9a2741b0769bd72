//! Error types for the monitoring library.

use std::time::Duration;

use thiserror::Error;

use crate::types::AccountId;

/// Errors that can occur while monitoring IMAP accounts.
///
/// None of these are fatal to the host: the dispatcher logs them and the
/// affected account simply goes without monitoring.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Protocol parsing error.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// The server sent something the monitor cannot make sense of.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server supports neither NOTIFY nor IDLE.
    #[error("Server does not support {0}")]
    CapabilityUnsupported(&'static str),

    /// The connection has been closed (BYE or end of stream).
    #[error("Connection closed")]
    TransportClosed,

    /// The account's pooled connection has a command in flight.
    #[error("Connection for account {0} is busy")]
    ResourceBusy(AccountId),

    /// The account already has a monitor session.
    #[error("Account {0} is already monitored")]
    AlreadyMonitored(AccountId),

    /// The host has no idle connection to hand over.
    #[error("No idle connection for account {0}")]
    NoConnection(AccountId),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
