//! Core scheduling types: clock, errors, jobs, schedules, and the task
//! lifecycle.

pub mod clock;
pub mod error;
pub mod job;
pub mod schedule;
pub mod task;
