//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

/// Worker poll period used across integration tests, short enough that a
/// manual-clock change is observed almost immediately.
pub const TICK: Duration = Duration::from_millis(10);

/// A fixed, unremarkable instant.
pub fn base_instant() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// Poll a condition until it holds or two seconds elapse.
pub async fn wait_for<F>(cond: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Give workers a few ticks to observe the current clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
