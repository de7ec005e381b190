use std::collections::HashSet;

use anyhow::{Context, bail};
use tracing::{debug, info, warn};

use crate::kv::KeyValueStore;
use crate::task::Task;

pub const TASKS_KEY: &str = "focusFlowTasks";
pub const COUNTER_KEY: &str = "focusFlowCounter";
pub const DEFAULT_COUNTER: u64 = 1;

/// Reads and writes the task list and id counter as two separate entries.
#[derive(Debug)]
pub struct Persistence<S> {
    kv: S,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save(&mut self, tasks: &[Task], counter: u64) -> anyhow::Result<()> {
        let encoded = serde_json::to_string(tasks).context("failed to encode task list")?;
        self.kv
            .set(TASKS_KEY, &encoded)
            .with_context(|| format!("failed to save {TASKS_KEY}"))?;
        self.kv
            .set(COUNTER_KEY, &counter.to_string())
            .with_context(|| format!("failed to save {COUNTER_KEY}"))?;
        debug!(counter, "saved task state");
        Ok(())
    }

    /// Never fails: absent or unreadable entries fall back to an empty
    /// list and a counter of 1, each entry independently.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> (Vec<Task>, u64) {
        let tasks = match self.load_tasks() {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "discarding unreadable task list");
                Vec::new()
            }
        };

        let stored_counter = match self.load_counter() {
            Ok(counter) => counter,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "discarding unreadable id counter");
                DEFAULT_COUNTER
            }
        };

        let counter = recover_counter(&tasks, stored_counter);
        if counter != stored_counter {
            warn!(stored = stored_counter, recovered = counter, "id counter behind stored ids");
        }

        info!(count = tasks.len(), counter, "loaded task state");
        (tasks, counter)
    }

    fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let Some(raw) = self.kv.get(TASKS_KEY)? else {
            debug!("no stored task list");
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tasks: Vec<Task> =
            serde_json::from_str(&raw).with_context(|| format!("failed parsing {TASKS_KEY}"))?;

        let mut seen = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !seen.insert(task.id.as_str()) {
                bail!("duplicate task id in {TASKS_KEY}: {}", task.id);
            }
        }

        Ok(tasks)
    }

    fn load_counter(&self) -> anyhow::Result<u64> {
        let Some(raw) = self.kv.get(COUNTER_KEY)? else {
            return Ok(DEFAULT_COUNTER);
        };
        let counter: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("failed parsing {COUNTER_KEY}: {raw:?}"))?;
        if counter == 0 {
            bail!("{COUNTER_KEY} must be positive");
        }
        Ok(counter)
    }
}

/// Raises `counter` past every numeric id suffix already in use.
pub fn recover_counter(tasks: &[Task], counter: u64) -> u64 {
    tasks
        .iter()
        .filter_map(Task::number)
        .max()
        .map(|max| counter.max(max.saturating_add(1)))
        .unwrap_or(counter)
}
