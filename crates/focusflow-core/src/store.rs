use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::datastore::Persistence;
use crate::kv::KeyValueStore;
use crate::task::{Category, Priority, Task, format_id};

/// Owns the task list and id counter. Every mutation is written through
/// to persistence; write failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct TaskStore<S: KeyValueStore> {
    tasks: Vec<Task>,
    counter: u64,
    dirty: bool,
    persistence: Persistence<S>,
}

impl<S: KeyValueStore> TaskStore<S> {
    #[tracing::instrument(skip(persistence))]
    pub fn open(persistence: Persistence<S>) -> Self {
        let (tasks, counter) = persistence.load();
        info!(count = tasks.len(), counter, "opened task store");
        Self {
            tasks,
            counter,
            dirty: false,
            persistence,
        }
    }

    pub fn create(&mut self, text: &str, category: Category, priority: Priority) -> Option<Task> {
        self.create_at(text, category, priority, Utc::now())
    }

    #[tracing::instrument(skip(self, text, now), fields(category = %category, priority = %priority))]
    pub fn create_at(
        &mut self,
        text: &str,
        category: Category,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Option<Task> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring empty task text");
            return None;
        }

        let Some(next) = self.counter.checked_add(1) else {
            warn!(counter = self.counter, "id counter exhausted, refusing to create task");
            return None;
        };
        let task = Task::new(self.counter, text.to_string(), category, priority, now);
        self.counter = next;
        self.tasks.push(task.clone());
        self.dirty = true;
        self.persist();

        debug!(id = %task.id, count = self.tasks.len(), "task created");
        Some(task)
    }

    /// Flips `completed` and returns the new value, or `None` for an unknown id.
    #[tracing::instrument(skip(self))]
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("toggle of unknown task ignored");
            return None;
        };
        task.completed = !task.completed;
        let completed = task.completed;
        self.dirty = true;
        self.persist();

        debug!(completed, "task toggled");
        Some(completed)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: &str) -> Option<Task> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            debug!("delete of unknown task ignored");
            return None;
        };
        let removed = self.tasks.remove(idx);
        self.dirty = true;
        self.persist();

        debug!(count = self.tasks.len(), "task deleted");
        Some(removed)
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Id the next successful `create` will assign.
    pub fn next_id(&self) -> String {
        format_id(self.counter)
    }

    /// Retries a write that failed earlier and hands back the storage
    /// backend. A store that was never changed writes nothing.
    #[tracing::instrument(skip(self), fields(dirty = self.dirty))]
    pub fn dispose(mut self) -> S {
        if self.dirty {
            self.persist();
        }
        info!(count = self.tasks.len(), "disposed task store");
        self.persistence.into_inner()
    }

    fn persist(&mut self) {
        match self.persistence.save(&self.tasks, self.counter) {
            Ok(()) => self.dirty = false,
            Err(err) => warn!(error = %format!("{err:#}"), "failed to persist task state"),
        }
    }
}
