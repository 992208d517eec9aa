//! In-process task scheduling with fixed intervals and calendar anchors.
//!
//! A [`Task`] binds a [`Job`] to a [`Schedule`]: a fixed interval or a
//! daily, weekly, or monthly anchor, all in naive local time. Starting a
//! task spawns a tokio worker that polls a [`Clock`] and runs the job at
//! each due time; missed due times are skipped or replayed according to
//! the task's [`CatchUpPolicy`]. A [`ScheduleManager`] keeps a registry
//! of tasks by unique name, with tag queries returning a [`TaskGroup`]
//! for batch control.
//!
//! # Example
//!
//! ```no_run
//! use metronome::{ScheduleManager, Task};
//!
//! #[tokio::main]
//! async fn main() -> metronome::Result<()> {
//!     let manager = ScheduleManager::new();
//!
//!     let report = Task::named("daily-report", metronome::FnJob::new(|| {
//!         println!("report sent");
//!     }));
//!     report.period_day_at("09:00:00")?.add_tag("reports");
//!     manager.register(&report)?;
//!
//!     report.start()?;
//!     // ... later
//!     report.stop()?;
//!     report.join().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod manager;
pub mod testing;

pub use self::core::clock::{Clock, SystemClock};
pub use self::core::error::{Error, Result};
pub use self::core::job::{FnJob, Job, JobError};
pub use self::core::schedule::{
    CatchUpPolicy, Interval, Schedule, StartTime, TimeOfDay, WeekdaySpec,
};
pub use self::core::task::Task;
pub use self::manager::{ScheduleManager, TaskGroup};
