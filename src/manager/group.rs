//! Batch operations over a set of tasks.

use std::ops::Add;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::core::clock::Clock;
use crate::core::error::{Error, Result};
use crate::core::schedule::{CatchUpPolicy, Interval, StartTime, TimeOfDay, WeekdaySpec};
use crate::core::task::Task;
use crate::manager::ScheduleManager;

/// An ordered collection of tasks, usually produced by a tag query.
///
/// Every configuration and lifecycle method applies to each member in
/// order and fails fast on the first error; members already processed keep
/// the applied change. Groups can be concatenated with `+`.
#[derive(Clone, Default)]
pub struct TaskGroup {
    tasks: Vec<Task>,
}

impl TaskGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of member tasks.
    pub fn count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterate over the members.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Whether the group contains this exact task (not merely one sharing
    /// its name).
    pub fn contains(&self, task: &Task) -> bool {
        self.tasks.iter().any(|member| member.same_task(task))
    }

    // ----------------------------------------------------------------------
    // Batch configuration
    // ----------------------------------------------------------------------

    /// Set a fixed-interval period on every member.
    pub fn period(&self, interval: impl Into<Interval>) -> Result<&Self> {
        let interval = interval.into();
        for task in &self.tasks {
            task.period(interval.clone())?;
        }
        Ok(self)
    }

    /// Set a daily anchor on every member.
    pub fn period_day_at(&self, at: impl Into<TimeOfDay>) -> Result<&Self> {
        let at = at.into();
        for task in &self.tasks {
            task.period_day_at(at.clone())?;
        }
        Ok(self)
    }

    /// Set a weekly anchor on every member.
    pub fn period_week_at(
        &self,
        at: impl Into<TimeOfDay>,
        weekday: impl Into<WeekdaySpec>,
    ) -> Result<&Self> {
        let at = at.into();
        let weekday = weekday.into();
        for task in &self.tasks {
            task.period_week_at(at.clone(), weekday.clone())?;
        }
        Ok(self)
    }

    /// Set a monthly anchor on every member.
    pub fn period_month_at(&self, at: impl Into<TimeOfDay>, day: u32) -> Result<&Self> {
        let at = at.into();
        for task in &self.tasks {
            task.period_month_at(at.clone(), day)?;
        }
        Ok(self)
    }

    /// Delay activation of every member.
    pub fn delay(&self, interval: impl Into<Interval>) -> Result<&Self> {
        let interval = interval.into();
        for task in &self.tasks {
            task.delay(interval.clone())?;
        }
        Ok(self)
    }

    /// Remove configured delays.
    pub fn clear_delay(&self) -> Result<&Self> {
        for task in &self.tasks {
            task.clear_delay()?;
        }
        Ok(self)
    }

    /// Set an activation instant on every member.
    pub fn start_at(&self, at: impl Into<StartTime>) -> Result<&Self> {
        let at = at.into();
        for task in &self.tasks {
            task.start_at(at.clone())?;
        }
        Ok(self)
    }

    /// Remove configured activation instants.
    pub fn clear_start_at(&self) -> Result<&Self> {
        for task in &self.tasks {
            task.clear_start_at()?;
        }
        Ok(self)
    }

    /// Make every member run a fixed number of times.
    pub fn nonperiodic(&self, count: u32) -> Result<&Self> {
        for task in &self.tasks {
            task.nonperiodic(count)?;
        }
        Ok(self)
    }

    /// Make every member run until stopped.
    pub fn periodic(&self) -> Result<&Self> {
        for task in &self.tasks {
            task.periodic()?;
        }
        Ok(self)
    }

    /// Set the catch-up policy on every member.
    pub fn catch_up(&self, policy: CatchUpPolicy) -> Result<&Self> {
        for task in &self.tasks {
            task.catch_up(policy)?;
        }
        Ok(self)
    }

    /// Substitute the time source of every member.
    pub fn set_clock(&self, clock: Arc<dyn Clock>) -> Result<&Self> {
        for task in &self.tasks {
            task.set_clock(Arc::clone(&clock))?;
        }
        Ok(self)
    }

    /// Set the worker poll period of every member.
    pub fn tick_interval(&self, tick: StdDuration) -> Result<&Self> {
        for task in &self.tasks {
            task.tick_interval(tick)?;
        }
        Ok(self)
    }

    /// Add a tag to every member.
    pub fn add_tag(&self, tag: impl Into<String>) -> &Self {
        let tag = tag.into();
        for task in &self.tasks {
            task.add_tag(tag.clone());
        }
        self
    }

    /// Add several tags to every member.
    pub fn add_tags<I, S>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        for task in &self.tasks {
            task.add_tags(tags.iter().cloned());
        }
        self
    }

    /// Remove a tag from every member.
    pub fn remove_tag(&self, tag: &str) -> &Self {
        for task in &self.tasks {
            task.remove_tag(tag);
        }
        self
    }

    /// Remove several tags from every member.
    pub fn remove_tags<I, S>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<String> = tags
            .into_iter()
            .map(|tag| tag.as_ref().to_string())
            .collect();
        for task in &self.tasks {
            task.remove_tags(tags.iter());
        }
        self
    }

    /// Replace the tags of every member.
    pub fn set_tags<I, S>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        for task in &self.tasks {
            task.set_tags(tags.iter().cloned());
        }
        self
    }

    // ----------------------------------------------------------------------
    // Batch lifecycle
    // ----------------------------------------------------------------------

    /// Start every member.
    pub fn start(&self) -> Result<&Self> {
        for task in &self.tasks {
            task.start()?;
        }
        Ok(self)
    }

    /// Request a stop on every member.
    pub fn stop(&self) -> Result<&Self> {
        for task in &self.tasks {
            task.stop()?;
        }
        Ok(self)
    }

    /// Pause every member and wait until all workers have wound down. Each
    /// member stays registered with its manager and can be started again.
    pub async fn pause(&self) -> Result<&Self> {
        for task in &self.tasks {
            task.pause()?;
        }
        for task in &self.tasks {
            task.join().await;
        }
        Ok(self)
    }

    /// Move every managed member into another registry, or into a fresh
    /// one when `manager` is `None`. Returns the destination.
    ///
    /// Fails with [`Error::DuplicateName`] before moving anything if any
    /// member's name is already taken in the destination. Members not
    /// currently registered anywhere are left as they are.
    pub fn set_manager(&self, manager: Option<&ScheduleManager>) -> Result<ScheduleManager> {
        let target = manager.cloned().unwrap_or_default();
        for task in &self.tasks {
            if target.contains(task.name()) {
                return Err(Error::DuplicateName(task.name().to_string()));
            }
        }
        for task in &self.tasks {
            if let Some(current) = task.manager() {
                current.unregister(task.name());
                target.register(task)?;
            }
        }
        Ok(target)
    }
}

impl From<Vec<Task>> for TaskGroup {
    fn from(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }
}

impl FromIterator<Task> for TaskGroup {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TaskGroup {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl<'a> IntoIterator for &'a TaskGroup {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

impl Add for TaskGroup {
    type Output = TaskGroup;

    /// Concatenate two groups. Members are not deduplicated.
    fn add(mut self, rhs: TaskGroup) -> TaskGroup {
        self.tasks.extend(rhs.tasks);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::FnJob;

    fn noop(name: &str) -> Task {
        Task::named(name, FnJob::new(|| {}))
    }

    fn group(names: &[&str]) -> TaskGroup {
        names.iter().map(|name| noop(name)).collect()
    }

    #[test]
    fn test_concat_preserves_duplicates() {
        let a = group(&["x", "y"]);
        let shared = noop("z");
        let b: TaskGroup = vec![shared.clone()].into();
        let c: TaskGroup = vec![shared].into();

        let combined = a + b + c;
        assert_eq!(combined.count(), 4);
    }

    #[test]
    fn test_contains_is_identity_not_name() {
        let task = noop("x");
        let group: TaskGroup = vec![task.clone()].into();

        assert!(group.contains(&task));
        assert!(!group.contains(&noop("x")));
    }

    #[test]
    fn test_batch_configuration_applies_to_all() {
        let group = group(&["a", "b"]);
        group.period(60u64).unwrap();
        group.nonperiodic(2).unwrap();
        group.add_tag("batch");

        for task in &group {
            assert!(task.has_tag("batch"));
        }
    }

    #[test]
    fn test_batch_tag_removal() {
        let group = group(&["a", "b"]);
        group.add_tags(["x", "y", "z"]);

        group.remove_tag("x");
        group.remove_tags(["z", "absent"]);
        for task in &group {
            assert_eq!(task.tags(), vec!["y"]);
        }
    }

    #[test]
    fn test_batch_configuration_fails_fast() {
        let group = group(&["a", "b"]);
        assert!(group.period("99:00:00").is_err());
    }

    #[test]
    fn test_set_manager_into_fresh_registry() {
        let source = ScheduleManager::new();
        let a = noop("a");
        let b = noop("b");
        source.register(&a).unwrap();
        source.register(&b).unwrap();

        let moved = source.all_tasks().set_manager(None).unwrap();
        assert_eq!(moved.count(), 2);
        assert!(source.is_empty());
        assert!(a.manager().is_some());
    }

    #[test]
    fn test_set_manager_collision_moves_nothing() {
        let source = ScheduleManager::new();
        let target = ScheduleManager::new();
        source.register(&noop("a")).unwrap();
        source.register(&noop("b")).unwrap();
        target.register(&noop("b")).unwrap();

        let result = source.all_tasks().set_manager(Some(&target));
        assert!(matches!(result, Err(Error::DuplicateName(_))));
        assert_eq!(source.count(), 2);
        assert_eq!(target.count(), 1);
    }

    #[test]
    fn test_set_manager_skips_unmanaged_members() {
        let target = ScheduleManager::new();
        let managed = noop("managed");
        let loose = noop("loose");
        let source = ScheduleManager::new();
        source.register(&managed).unwrap();

        let group: TaskGroup = vec![managed.clone(), loose.clone()].into();
        let dest = group.set_manager(Some(&target)).unwrap();

        assert!(dest.contains("managed"));
        assert!(!dest.contains("loose"));
        assert!(loose.manager().is_none());
    }
}
