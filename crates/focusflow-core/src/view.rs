use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use crate::filter::Selector;
use crate::summary::{SummarySlot, summarize};
use crate::task::Task;

pub const DEFAULT_REMOVAL_DELAY_MS: i64 = 300;

/// Presentation primitives the synchronizer drives. Implementations own
/// all rendering detail; they never touch the task store.
pub trait ViewLayer {
    /// Creates the task's representation, or refreshes it in place.
    fn render_task(&mut self, task: &Task);
    fn set_visible(&mut self, id: &str, visible: bool);
    fn begin_removal(&mut self, id: &str);
    fn remove_task(&mut self, id: &str);
    fn write_summary(&mut self, slot: SummarySlot, value: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualState {
    Visible,
    Hidden,
    Removing { deadline: DateTime<Utc> },
}

/// Keeps a [`ViewLayer`] consistent with the store's task list and the
/// current filter selector.
#[derive(Debug, Clone)]
pub struct ViewSync {
    filter: Selector,
    removal_delay: Duration,
    states: HashMap<String, VisualState>,
}

impl Default for ViewSync {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_REMOVAL_DELAY_MS))
    }
}

impl ViewSync {
    pub fn new(removal_delay: Duration) -> Self {
        Self {
            filter: Selector::All,
            removal_delay,
            states: HashMap::new(),
        }
    }

    pub fn filter(&self) -> &Selector {
        &self.filter
    }

    pub fn state(&self, id: &str) -> Option<VisualState> {
        self.states.get(id).copied()
    }

    pub fn pending_removals(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, VisualState::Removing { .. }))
            .count()
    }

    #[tracing::instrument(skip(self, tasks, view), fields(count = tasks.len()))]
    pub fn sync_all<V: ViewLayer>(&mut self, tasks: &[Task], view: &mut V) {
        let stale: Vec<String> = self
            .states
            .iter()
            .filter(|(id, state)| {
                !matches!(state, VisualState::Removing { .. }) && !tasks.iter().any(|t| &t.id == *id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            debug!(%id, "dropping representation of missing task");
            view.remove_task(&id);
            self.states.remove(&id);
        }

        for task in tasks {
            self.render(task, view);
        }
        self.apply_filter(tasks, view);
        write_summary(tasks, view);
    }

    pub fn task_added<V: ViewLayer>(&mut self, task: &Task, tasks: &[Task], view: &mut V) {
        self.render(task, view);
        self.apply_filter(tasks, view);
        write_summary(tasks, view);
    }

    /// Completion is an attribute of the rendered row, so the row is
    /// refreshed in place; its visibility may still change under
    /// `active`/`completed` filters.
    pub fn task_toggled<V: ViewLayer>(&mut self, task: &Task, tasks: &[Task], view: &mut V) {
        view.render_task(task);
        self.apply_filter(tasks, view);
        write_summary(tasks, view);
    }

    #[tracing::instrument(skip(self, tasks, view))]
    pub fn set_filter<V: ViewLayer>(&mut self, selector: Selector, tasks: &[Task], view: &mut V) {
        self.filter = selector;
        self.apply_filter(tasks, view);
    }

    /// Called after the store has already dropped `id`. A second delete
    /// while the removal is still pending finalizes it immediately.
    #[tracing::instrument(skip(self, tasks, view, now))]
    pub fn task_deleted<V: ViewLayer>(
        &mut self,
        id: &str,
        tasks: &[Task],
        view: &mut V,
        now: DateTime<Utc>,
    ) {
        match self.states.get(id).copied() {
            Some(VisualState::Removing { .. }) => {
                debug!("repeat delete; finalizing removal");
                view.remove_task(id);
                self.states.remove(id);
            }
            Some(_) => {
                view.begin_removal(id);
                self.states.insert(
                    id.to_string(),
                    VisualState::Removing {
                        deadline: now + self.removal_delay,
                    },
                );
            }
            None => debug!("delete for unrendered task ignored"),
        }
        write_summary(tasks, view);
    }

    /// Finalizes removals whose deadline has passed.
    pub fn tick<V: ViewLayer>(&mut self, now: DateTime<Utc>, view: &mut V) -> usize {
        let due: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| matches!(state, VisualState::Removing { deadline } if *deadline <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            view.remove_task(id);
            self.states.remove(id);
        }
        if !due.is_empty() {
            debug!(count = due.len(), "finalized removals");
        }
        due.len()
    }

    pub fn flush<V: ViewLayer>(&mut self, view: &mut V) -> usize {
        self.tick(DateTime::<Utc>::MAX_UTC, view)
    }

    fn render<V: ViewLayer>(&mut self, task: &Task, view: &mut V) {
        view.render_task(task);
        if !matches!(self.states.get(&task.id), Some(VisualState::Removing { .. })) {
            self.states.remove(&task.id);
        }
    }

    fn apply_filter<V: ViewLayer>(&mut self, tasks: &[Task], view: &mut V) {
        for task in tasks {
            let current = self.states.get(&task.id).copied();
            if matches!(current, Some(VisualState::Removing { .. })) {
                continue;
            }

            let next = if self.filter.matches(task) {
                VisualState::Visible
            } else {
                VisualState::Hidden
            };
            if current != Some(next) {
                trace!(id = %task.id, ?next, "visibility changed");
                view.set_visible(&task.id, next == VisualState::Visible);
                self.states.insert(task.id.clone(), next);
            }
        }
    }
}

fn write_summary<V: ViewLayer>(tasks: &[Task], view: &mut V) {
    for (slot, value) in summarize(tasks).slots() {
        view.write_summary(slot, value);
    }
}
