//! Wall-clock abstraction.
//!
//! Every time comparison in the scheduler goes through a [`Clock`] so that
//! deterministic tests can substitute a controlled source. See
//! [`crate::testing::ManualClock`] for the test double.

use chrono::{Local, NaiveDateTime};

/// Source of the current instant.
///
/// The scheduler works in naive local time: calendar anchors such as
/// "every day at 09:00:00" refer to the clock on the wall, not UTC.
pub trait Clock: Send + Sync {
    /// Return the current instant.
    fn now(&self) -> NaiveDateTime;
}

/// The default clock, backed by the system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
