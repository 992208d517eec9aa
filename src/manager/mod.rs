//! Task registry.
//!
//! A [`ScheduleManager`] owns a name-keyed registry of tasks. Registration
//! enforces unique names and single ownership; lookups by name return one
//! task, lookups by tag return a [`TaskGroup`] for batch operations. A
//! worker that stops (rather than pauses) unregisters its task on the way
//! out.

mod group;

pub use group::TaskGroup;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::core::error::{Error, Result};
use crate::core::job::Job;
use crate::core::task::Task;

pub(crate) struct ManagerInner {
    tasks: Mutex<HashMap<String, Task>>,
}

impl ManagerInner {
    /// Drop a registry entry; called by workers on non-pause shutdown.
    pub(crate) fn remove_entry(&self, name: &str) {
        let removed = self.tasks.lock().expect("lock poisoned").remove(name);
        if let Some(task) = removed {
            task.detach_manager();
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        // Workers poll their flags; request a stop for anything still live
        // so no worker outlasts its registry.
        let tasks = self.tasks.lock().expect("lock poisoned");
        for task in tasks.values() {
            if task.is_running() {
                let _ = task.stop();
            }
            task.detach_manager();
        }
    }
}

/// A name-keyed task registry. Clones share the registry.
#[derive(Clone, Default)]
pub struct ScheduleManager {
    inner: Arc<ManagerInner>,
}

impl Default for ManagerInner {
    fn default() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl ScheduleManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    /// Register an existing task under its name.
    ///
    /// Fails with [`Error::DuplicateName`] if the name is taken here, and
    /// with [`Error::InvalidState`] if the task already belongs to a
    /// registry. A task has at most one owner at a time.
    pub fn register(&self, task: &Task) -> Result<&Self> {
        {
            let mut tasks = self.inner.tasks.lock().expect("lock poisoned");
            if tasks.contains_key(task.name()) {
                return Err(Error::DuplicateName(task.name().to_string()));
            }
            if task.has_manager() {
                return Err(Error::invalid_state(format!(
                    "task {} is already managed",
                    task.name()
                )));
            }
            tasks.insert(task.name().to_string(), task.clone());
        }
        task.attach_manager(&self.inner);
        tracing::debug!(task = %task.name(), "task registered");
        Ok(self)
    }

    /// Create and register a task in one step. Without an explicit name a
    /// unique `Task-<hex>` name is generated.
    pub fn register_task<J: Job + 'static>(
        &self,
        job: J,
        name: Option<String>,
    ) -> Result<Task> {
        let task = match name {
            Some(name) => Task::named(name, job),
            None => {
                let mut name = format!("Task-{}", Uuid::new_v4().simple());
                // Regenerate on the off chance the token collides.
                while self.contains(&name) {
                    name = format!("Task-{}", Uuid::new_v4().simple());
                }
                Task::named(name, job)
            }
        };
        self.register(&task)?;
        Ok(task)
    }

    /// Remove a task by name. Removing an absent name is not an error.
    pub fn unregister(&self, name: &str) -> &Self {
        self.inner.remove_entry(name);
        self
    }

    /// Remove every task carrying the tag.
    pub fn unregister_by_tag(&self, tag: &str) -> &Self {
        for task in self.tasks(tag) {
            self.inner.remove_entry(task.name());
        }
        self
    }

    /// Remove every task carrying any of the tags.
    pub fn unregister_by_tags<I, S>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.unregister_by_tag(tag.as_ref());
        }
        self
    }

    /// Look up a task by name.
    pub fn task(&self, name: &str) -> Result<Task> {
        self.inner
            .tasks
            .lock()
            .expect("lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(name.to_string()))
    }

    /// All tasks carrying the tag.
    pub fn tasks(&self, tag: &str) -> TaskGroup {
        let tasks = self.inner.tasks.lock().expect("lock poisoned");
        tasks
            .values()
            .filter(|task| task.has_tag(tag))
            .cloned()
            .collect()
    }

    /// All tasks carrying any of the tags, each included once.
    pub fn tasks_any<I, S>(&self, tags: I) -> TaskGroup
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        let tasks = self.inner.tasks.lock().expect("lock poisoned");
        tasks
            .values()
            .filter(|task| wanted.iter().any(|tag| task.has_tag(tag)))
            .cloned()
            .collect()
    }

    /// Every registered task.
    pub fn all_tasks(&self) -> TaskGroup {
        let tasks = self.inner.tasks.lock().expect("lock poisoned");
        tasks.values().cloned().collect()
    }

    /// Every registered task with a live worker.
    pub fn running_tasks(&self) -> TaskGroup {
        let tasks = self.inner.tasks.lock().expect("lock poisoned");
        tasks
            .values()
            .filter(|task| task.is_running())
            .cloned()
            .collect()
    }

    /// Every registered task without a live worker.
    pub fn pending_tasks(&self) -> TaskGroup {
        let tasks = self.inner.tasks.lock().expect("lock poisoned");
        tasks
            .values()
            .filter(|task| !task.is_running())
            .cloned()
            .collect()
    }

    /// Whether a task with the name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .tasks
            .lock()
            .expect("lock poisoned")
            .contains_key(name)
    }

    /// Number of registered tasks.
    pub fn count(&self) -> usize {
        self.inner.tasks.lock().expect("lock poisoned").len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl fmt::Display for ScheduleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScheduleManager({} tasks)", self.count())
    }
}

impl fmt::Debug for ScheduleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .inner
            .tasks
            .lock()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        f.debug_struct("ScheduleManager")
            .field("tasks", &names)
            .finish()
    }
}
