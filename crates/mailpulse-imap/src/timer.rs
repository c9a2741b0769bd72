//! Owned, cancellable deadlines.
//!
//! Nothing in the monitor spawns a task per timer. Each timer is a plain
//! deadline owned by the component it belongs to; the dispatcher sleeps until
//! the earliest armed deadline and then asks the owners to fire whatever is
//! due. Cancelling a timer is therefore just clearing its deadline, and a
//! timer dropped together with its owner can never fire afterwards.
//!
//! All instants are [`tokio::time::Instant`] so tests can drive them with a
//! paused clock, or pass explicit instants to the sans-I/O components.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mailpulse_imap::timer::Timer;
//! use tokio::time::Instant;
//!
//! let start = Instant::now();
//! let mut timer = Timer::new();
//! timer.arm_recurring(start, Duration::from_secs(60));
//!
//! assert!(!timer.fire(start + Duration::from_secs(30)));
//! assert!(timer.fire(start + Duration::from_secs(60)));
//! assert_eq!(timer.deadline(), Some(start + Duration::from_secs(120)));
//! ```

use std::time::Duration;

use tokio::time::Instant;

/// A one-shot or recurring deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl Timer {
    /// Creates a disarmed timer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deadline: None,
            period: None,
        }
    }

    /// Arms the timer to fire once, `delay` after `now`.
    ///
    /// Re-arming an armed timer replaces its deadline.
    pub fn arm_once(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
        self.period = None;
    }

    /// Arms the timer to fire every `period`, starting `period` after `now`.
    pub fn arm_recurring(&mut self, now: Instant, period: Duration) {
        self.deadline = Some(now + period);
        self.period = Some(period);
    }

    /// Disarms the timer.
    pub const fn cancel(&mut self) {
        self.deadline = None;
        self.period = None;
    }

    /// Returns true if the timer will fire at some point.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The next deadline, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if the deadline has been reached.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Fires the timer if it is due.
    ///
    /// A one-shot timer disarms; a recurring one moves its deadline one period
    /// past `now`. Returns true if the timer fired.
    pub fn fire(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        match self.period {
            Some(period) => self.deadline = Some(now + period),
            None => self.deadline = None,
        }
        true
    }
}

/// Returns the earliest of a set of optional deadlines.
pub fn earliest<I>(deadlines: I) -> Option<Instant>
where
    I: IntoIterator<Item = Option<Instant>>,
{
    deadlines.into_iter().flatten().min()
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

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_new_timer_is_disarmed() {
        let timer = Timer::new();
        assert!(!timer.is_armed());
        assert!(!timer.is_due(Instant::now()));
        assert_eq!(timer.deadline(), None);
    }

    #[test]
    fn test_one_shot_fires_once() {
        let start = Instant::now();
        let mut timer = Timer::new();
        timer.arm_once(start, 80 * MS);

        assert!(!timer.fire(start + 79 * MS));
        assert!(timer.fire(start + 80 * MS));
        assert!(!timer.is_armed());
        assert!(!timer.fire(start + 200 * MS));
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let start = Instant::now();
        let mut timer = Timer::new();
        timer.arm_once(start, 80 * MS);
        timer.arm_once(start + 30 * MS, 80 * MS);

        assert!(!timer.fire(start + 100 * MS));
        assert!(timer.fire(start + 110 * MS));
    }

    #[test]
    fn test_recurring_rearms() {
        let start = Instant::now();
        let mut timer = Timer::new();
        timer.arm_recurring(start, 10 * MS);

        assert!(timer.fire(start + 10 * MS));
        assert!(timer.is_armed());
        assert_eq!(timer.deadline(), Some(start + 20 * MS));
        assert!(timer.fire(start + 25 * MS));
        assert_eq!(timer.deadline(), Some(start + 35 * MS));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut timer = Timer::new();
        timer.arm_recurring(start, 10 * MS);
        timer.cancel();

        assert!(!timer.is_armed());
        assert!(!timer.fire(start + 100 * MS));
    }

    #[test]
    fn test_earliest() {
        let start = Instant::now();
        assert_eq!(earliest([None, None]), None);
        assert_eq!(
            earliest([Some(start + 5 * MS), None, Some(start + 2 * MS)]),
            Some(start + 2 * MS)
        );
    }
}
