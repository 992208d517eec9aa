//! The task descriptor and its worker lifecycle.
//!
//! A [`Task`] is a cheaply cloneable handle over shared state: the job, the
//! period configuration, tags, and the flags driving the worker. Starting a
//! task spawns one worker that polls the clock at the tick interval and
//! runs the job at each due time; stop and pause raise flags the worker
//! observes at the next tick boundary.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration as StdDuration;

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::error::{Error, Result};
use super::job::{FnJob, Job};
use super::schedule::{
    CatchUpPolicy, Interval, Schedule, StartTime, TimeOfDay, WeekdaySpec,
};
use crate::manager::{ManagerInner, ScheduleManager};

/// Default worker poll period.
const DEFAULT_TICK: StdDuration = StdDuration::from_secs(1);

/// Pre-start configuration, guarded by one lock.
struct TaskConfig {
    schedule: Option<Schedule>,
    delay: Option<chrono::Duration>,
    start_at: Option<NaiveDateTime>,
    periodic: bool,
    remaining: u32,
    catch_up: CatchUpPolicy,
    clock: Arc<dyn Clock>,
    tick: StdDuration,
}

/// State owned by a running worker, readable through the handle.
#[derive(Default)]
struct Runtime {
    next_run: Option<NaiveDateTime>,
    active_start_at: Option<NaiveDateTime>,
}

struct TaskInner {
    name: String,
    job: Arc<dyn Job>,
    config: Mutex<TaskConfig>,
    runtime: Mutex<Runtime>,
    tags: Mutex<Vec<String>>,
    started: AtomicBool,
    stop_requested: AtomicBool,
    pause_requested: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    manager: Mutex<Weak<ManagerInner>>,
}

/// A schedulable unit of work.
///
/// Clones share state; configuring or starting any clone affects all of
/// them. Configuration methods chain and fail with
/// [`Error::InvalidState`] while the task is running.
///
/// # Example
///
/// ```no_run
/// use metronome::Task;
///
/// # fn demo() -> metronome::Result<()> {
/// let task = Task::from_fn(|| println!("tick"));
/// task.period(30u64)?.delay(5u64)?;
/// task.start()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// Create a task with a generated `Task-<hex>` name.
    pub fn new<J: Job + 'static>(job: J) -> Self {
        Self::named(format!("Task-{}", Uuid::new_v4().simple()), job)
    }

    /// Create a task with an explicit name.
    pub fn named<J: Job + 'static>(name: impl Into<String>, job: J) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                job: Arc::new(job),
                config: Mutex::new(TaskConfig {
                    schedule: None,
                    delay: None,
                    start_at: None,
                    periodic: true,
                    remaining: 0,
                    catch_up: CatchUpPolicy::default(),
                    clock: Arc::new(SystemClock),
                    tick: DEFAULT_TICK,
                }),
                runtime: Mutex::new(Runtime::default()),
                tags: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                pause_requested: AtomicBool::new(false),
                worker: Mutex::new(None),
                manager: Mutex::new(Weak::new()),
            }),
        }
    }

    /// Create a task from a plain closure, with a generated name.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(FnJob::new(f))
    }

    // ----------------------------------------------------------------------
    // Introspection
    // ----------------------------------------------------------------------

    /// The task name, fixed at construction.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether a worker is currently attached.
    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// The next due time, or the activation instant while the worker is
    /// still waiting out a delay. `None` when the task is not running.
    pub fn next_run(&self) -> Option<NaiveDateTime> {
        let runtime = self.inner.runtime.lock().expect("lock poisoned");
        runtime.next_run.or_else(|| {
            if self.is_running() {
                runtime.active_start_at
            } else {
                None
            }
        })
    }

    /// The manager this task is registered with, if any.
    pub fn manager(&self) -> Option<ScheduleManager> {
        self.inner
            .manager
            .lock()
            .expect("lock poisoned")
            .upgrade()
            .map(ScheduleManager::from_inner)
    }

    // ----------------------------------------------------------------------
    // Period configuration
    // ----------------------------------------------------------------------

    /// Fire at a fixed interval: seconds, a duration, or `"HH:MM:SS"`.
    pub fn period(&self, interval: impl Into<Interval>) -> Result<&Self> {
        self.ensure_idle()?;
        let interval = interval.into().resolve_std()?;
        if interval.is_zero() {
            return Err(Error::time_format("period interval must be positive"));
        }
        self.config().schedule = Some(Schedule::Every { interval });
        Ok(self)
    }

    /// Fire every day at the given time of day.
    pub fn period_day_at(&self, at: impl Into<TimeOfDay>) -> Result<&Self> {
        self.ensure_idle()?;
        let at = at.into().resolve()?;
        self.config().schedule = Some(Schedule::Day { at });
        Ok(self)
    }

    /// Fire every week on the given weekday at the given time of day.
    pub fn period_week_at(
        &self,
        at: impl Into<TimeOfDay>,
        weekday: impl Into<WeekdaySpec>,
    ) -> Result<&Self> {
        self.ensure_idle()?;
        let at = at.into().resolve()?;
        let weekday = weekday.into().resolve()?;
        self.config().schedule = Some(Schedule::Week { at, weekday });
        Ok(self)
    }

    /// Fire every month on the given day (1-31) at the given time of day.
    /// Months lacking the day are skipped.
    pub fn period_month_at(&self, at: impl Into<TimeOfDay>, day: u32) -> Result<&Self> {
        self.ensure_idle()?;
        if !(1..=31).contains(&day) {
            return Err(Error::time_format(format!("day of month out of range: {day}")));
        }
        let at = at.into().resolve()?;
        self.config().schedule = Some(Schedule::Month { at, day });
        Ok(self)
    }

    // ----------------------------------------------------------------------
    // Activation and repetition
    // ----------------------------------------------------------------------

    /// Delay activation by an interval after `start`. Clears any
    /// configured start time; the two are mutually exclusive.
    pub fn delay(&self, interval: impl Into<Interval>) -> Result<&Self> {
        self.ensure_idle()?;
        let delay = interval.into().resolve()?;
        let mut config = self.config();
        config.delay = Some(delay);
        config.start_at = None;
        Ok(self)
    }

    /// Remove a configured delay.
    pub fn clear_delay(&self) -> Result<&Self> {
        self.ensure_idle()?;
        self.config().delay = None;
        Ok(self)
    }

    /// Do not activate before an absolute instant: a datetime, `"HH:MM:SS"`
    /// (today), or `"MM-DD HH:MM:SS"` (this year). Clears any configured
    /// delay; the two are mutually exclusive.
    pub fn start_at(&self, at: impl Into<StartTime>) -> Result<&Self> {
        self.ensure_idle()?;
        let mut config = self.config();
        let now = config.clock.now();
        config.start_at = Some(at.into().resolve(now)?);
        config.delay = None;
        Ok(self)
    }

    /// Remove a configured start time.
    pub fn clear_start_at(&self) -> Result<&Self> {
        self.ensure_idle()?;
        self.config().start_at = None;
        Ok(self)
    }

    /// Run a fixed number of times, then stop. `count` must be positive.
    pub fn nonperiodic(&self, count: u32) -> Result<&Self> {
        self.ensure_idle()?;
        if count == 0 {
            return Err(Error::time_format("repeat count must be positive"));
        }
        let mut config = self.config();
        config.periodic = false;
        config.remaining = count;
        Ok(self)
    }

    /// Run until stopped (the default).
    pub fn periodic(&self) -> Result<&Self> {
        self.ensure_idle()?;
        let mut config = self.config();
        config.periodic = true;
        config.remaining = 0;
        Ok(self)
    }

    /// Choose how missed due times are handled. The default is
    /// [`CatchUpPolicy::SkipMissed`].
    pub fn catch_up(&self, policy: CatchUpPolicy) -> Result<&Self> {
        self.ensure_idle()?;
        self.config().catch_up = policy;
        Ok(self)
    }

    /// Substitute the time source. Intended for tests.
    pub fn set_clock(&self, clock: Arc<dyn Clock>) -> Result<&Self> {
        self.ensure_idle()?;
        self.config().clock = clock;
        Ok(self)
    }

    /// Set the worker poll period. The default is one second.
    pub fn tick_interval(&self, tick: StdDuration) -> Result<&Self> {
        self.ensure_idle()?;
        self.config().tick = tick;
        Ok(self)
    }

    // ----------------------------------------------------------------------
    // Tags
    // ----------------------------------------------------------------------

    /// Add a tag, ignoring duplicates. Tags may change while running.
    pub fn add_tag(&self, tag: impl Into<String>) -> &Self {
        let tag = tag.into();
        let mut tags = self.inner.tags.lock().expect("lock poisoned");
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        drop(tags);
        self
    }

    /// Add several tags, ignoring duplicates.
    pub fn add_tags<I, S>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    /// Remove a tag if present.
    pub fn remove_tag(&self, tag: &str) -> &Self {
        let mut tags = self.inner.tags.lock().expect("lock poisoned");
        tags.retain(|t| t != tag);
        drop(tags);
        self
    }

    /// Remove several tags.
    pub fn remove_tags<I, S>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.remove_tag(tag.as_ref());
        }
        self
    }

    /// Replace all tags.
    pub fn set_tags<I, S>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.tags.lock().expect("lock poisoned").clear();
        self.add_tags(tags)
    }

    /// Snapshot of the current tags, in insertion order.
    pub fn tags(&self) -> Vec<String> {
        self.inner.tags.lock().expect("lock poisoned").clone()
    }

    /// Whether the task carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.inner
            .tags
            .lock()
            .expect("lock poisoned")
            .iter()
            .any(|t| t == tag)
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Spawn the worker. Fails if no period is configured, if the task is
    /// already running, or if a previous worker has not yet wound down.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) -> Result<&Self> {
        // Held for the whole transition so two concurrent start() calls
        // serialize and exactly one can spawn a worker.
        let mut worker = self.inner.worker.lock().expect("lock poisoned");
        if self.is_running() {
            return Err(Error::invalid_state(format!(
                "task {} is already running",
                self.name()
            )));
        }
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                return Err(Error::invalid_state(format!(
                    "task {} is still shutting down",
                    self.name()
                )));
            }
        }

        let (schedule, policy, clock, tick, periodic, remaining) = {
            let config = self.config();
            let schedule = config.schedule.clone().ok_or_else(|| {
                Error::invalid_state(format!("task {} has no period configured", self.name()))
            })?;
            let now = config.clock.now();
            // delay and start_at are mutually exclusive; at most one is set
            let activation = match (config.delay, config.start_at) {
                (Some(delay), _) => now + delay,
                (None, Some(start_at)) => start_at,
                (None, None) => now,
            };
            let mut runtime = self.inner.runtime.lock().expect("lock poisoned");
            runtime.next_run = None;
            runtime.active_start_at = (activation > now).then_some(activation);
            (
                schedule,
                config.catch_up,
                Arc::clone(&config.clock),
                config.tick,
                config.periodic,
                config.remaining,
            )
        };

        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.inner.pause_requested.store(false, Ordering::SeqCst);
        self.inner.started.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(self.clone().run_worker(
            schedule, policy, clock, tick, periodic, remaining,
        ));
        *worker = Some(handle);

        tracing::debug!(task = %self.name(), "task started");
        Ok(self)
    }

    /// Ask the worker to stop. The worker observes the request at the next
    /// tick boundary, unregisters the task from its manager, and exits;
    /// use [`Task::join`] to wait for it.
    pub fn stop(&self) -> Result<&Self> {
        if !self.is_running() {
            return Err(Error::invalid_state(format!(
                "task {} is not running",
                self.name()
            )));
        }
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        tracing::debug!(task = %self.name(), "stop requested");
        Ok(self)
    }

    /// Ask the worker to stop while keeping the task registered with its
    /// manager. The descriptor stays intact and can be reconfigured and
    /// started again. An unexpired activation delay is carried over to the
    /// next start.
    pub fn pause(&self) -> Result<&Self> {
        if !self.is_running() {
            return Err(Error::invalid_state(format!(
                "task {} is not running",
                self.name()
            )));
        }
        self.inner.pause_requested.store(true, Ordering::SeqCst);
        tracing::debug!(task = %self.name(), "pause requested");
        Ok(self)
    }

    /// Wait for the current worker to exit, if one was spawned.
    pub async fn join(&self) {
        let handle = self.inner.worker.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            // A panicking job takes its worker down; nothing to propagate.
            let _ = handle.await;
        }
    }

    // ----------------------------------------------------------------------
    // Worker
    // ----------------------------------------------------------------------

    async fn run_worker(
        self,
        schedule: Schedule,
        policy: CatchUpPolicy,
        clock: Arc<dyn Clock>,
        tick: StdDuration,
        periodic: bool,
        mut remaining: u32,
    ) {
        // Wait out the activation instant, if any.
        loop {
            if self.halt_requested() {
                self.finish(&clock);
                return;
            }
            let activation = self
                .inner
                .runtime
                .lock()
                .expect("lock poisoned")
                .active_start_at;
            match activation {
                Some(at) if clock.now() < at => tokio::time::sleep(tick).await,
                _ => break,
            }
        }

        {
            let now = clock.now();
            let mut runtime = self.inner.runtime.lock().expect("lock poisoned");
            runtime.active_start_at = None;
            runtime.next_run = Some(schedule.initial_run(now));
        }

        loop {
            if self.halt_requested() {
                break;
            }
            let due = self
                .inner
                .runtime
                .lock()
                .expect("lock poisoned")
                .next_run
                .unwrap_or_else(|| clock.now());
            if clock.now() >= due {
                tracing::trace!(task = %self.name(), due = %due, "running job");
                if let Err(error) = self.inner.job.run().await {
                    tracing::warn!(task = %self.name(), %error, "job failed");
                }
                if !periodic {
                    remaining = remaining.saturating_sub(1);
                    if remaining == 0 {
                        break;
                    }
                }
                let next = schedule.next_run(due, clock.now(), policy);
                self.inner.runtime.lock().expect("lock poisoned").next_run = Some(next);
            } else {
                tokio::time::sleep(tick).await;
            }
        }

        self.finish(&clock);
    }

    /// Worker teardown. On pause the task stays registered and keeps an
    /// unexpired delay; otherwise it is unregistered from its manager.
    fn finish(&self, clock: &Arc<dyn Clock>) {
        let paused = self.inner.pause_requested.load(Ordering::SeqCst);
        if paused {
            let now = clock.now();
            let mut config = self.config();
            let mut runtime = self.inner.runtime.lock().expect("lock poisoned");
            // Only an unexpired delay carries over, as the remaining time
            // to fire; once the activation instant has been consumed the
            // delay is spent and must not be re-applied on restart. A
            // still-future start_at is already in config unchanged.
            match runtime.active_start_at.take() {
                Some(at) if at > now => {
                    if config.start_at.is_none() {
                        config.delay = Some(at - now);
                    }
                }
                _ => config.delay = None,
            }
            if matches!(config.start_at, Some(at) if at <= now) {
                config.start_at = None;
            }
            runtime.next_run = None;
        } else {
            {
                let mut runtime = self.inner.runtime.lock().expect("lock poisoned");
                runtime.next_run = None;
                runtime.active_start_at = None;
            }
            let manager = self.inner.manager.lock().expect("lock poisoned").upgrade();
            if let Some(manager) = manager {
                manager.remove_entry(self.name());
            }
        }
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.inner.pause_requested.store(false, Ordering::SeqCst);
        self.inner.started.store(false, Ordering::SeqCst);
        tracing::debug!(task = %self.name(), paused, "worker finished");
    }

    fn halt_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
            || self.inner.pause_requested.load(Ordering::SeqCst)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::invalid_state(format!(
                "task {} is running",
                self.name()
            )));
        }
        Ok(())
    }

    fn config(&self) -> std::sync::MutexGuard<'_, TaskConfig> {
        self.inner.config.lock().expect("lock poisoned")
    }

    // ----------------------------------------------------------------------
    // Manager linkage
    // ----------------------------------------------------------------------

    pub(crate) fn attach_manager(&self, manager: &Arc<ManagerInner>) {
        *self.inner.manager.lock().expect("lock poisoned") = Arc::downgrade(manager);
    }

    pub(crate) fn detach_manager(&self) {
        *self.inner.manager.lock().expect("lock poisoned") = Weak::new();
    }

    pub(crate) fn has_manager(&self) -> bool {
        self.inner
            .manager
            .lock()
            .expect("lock poisoned")
            .upgrade()
            .is_some()
    }

    pub(crate) fn same_task(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task({}, running={}, next_run={:?})",
            self.name(),
            self.is_running(),
            self.next_run()
        )
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("running", &self.is_running())
            .field("next_run", &self.next_run())
            .field("tags", &self.tags())
            .finish()
    }
}
