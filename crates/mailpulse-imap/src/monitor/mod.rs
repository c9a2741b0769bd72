//! Monitor sessions, the session registry, and the dispatcher loop.
//!
//! - [`MonitorSession`]: the NOTIFY/IDLE state machine for one connection
//! - [`SessionRegistry`]: at most one session per account, connection stealing
//! - [`Monitor`]: the event loop that feeds both and flushes notifications

mod dispatcher;
mod registry;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{Monitor, MonitorEvent, MonitorEvents, MonitorHandle, channel};
pub use registry::SessionRegistry;
pub use session::{Disposition, INBOX, Mode, MonitorSession, SessionState, Termination};
