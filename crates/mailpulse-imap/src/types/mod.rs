//! Core monitoring types.
//!
//! Identifiers the monitor passes back to the host, and the small value types
//! that flow between the parser, the sessions, and the aggregator.

#![allow(clippy::missing_const_for_fn)]

mod identifiers;
mod mailbox;

pub use identifiers::{AccountId, ConnectionId, MailboxRef};
pub use mailbox::{MailboxCounts, MailboxStatus, MessageSummary};
