//! Test doubles for deterministic scheduler tests.
//!
//! [`ManualClock`] replaces the system time source so due times can be
//! reached by advancing the clock instead of sleeping through real time;
//! [`CountingJob`] and [`FailingJob`] stand in for real work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};

use crate::core::clock::Clock;
use crate::core::job::{Job, JobError};

/// A clock that only moves when told to. Clones share the instant.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn starting_at(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Jump to an absolute instant. Moving backwards is allowed.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().expect("lock poisoned") = now;
    }

    /// Move forward by a duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("lock poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().expect("lock poisoned")
    }
}

/// A job that counts its invocations.
#[derive(Default)]
pub struct CountingJob {
    runs: AtomicUsize,
}

impl CountingJob {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of completed invocations.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for CountingJob {
    async fn run(&self) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A job that fails its first `failures` invocations, then succeeds.
pub struct FailingJob {
    failures: usize,
    attempts: AtomicUsize,
}

impl FailingJob {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: AtomicUsize::new(0),
        })
    }

    /// Total invocations so far, failed or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for FailingJob {
    async fn run(&self) -> Result<(), JobError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Err(JobError::Failed(format!("simulated failure {attempt}")))
        } else {
            Ok(())
        }
    }
}
