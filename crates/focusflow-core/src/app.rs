use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::datastore::Persistence;
use crate::filter::Selector;
use crate::kv::KeyValueStore;
use crate::store::TaskStore;
use crate::task::{Category, Priority, Task};
use crate::view::{ViewLayer, ViewSync};

/// User intent as reported by the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Submit {
        text: String,
        category: Category,
        priority: Priority,
    },
    Toggle(String),
    Delete(String),
    Filter(Selector),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(Task),
    Toggled { id: String, completed: bool },
    Deleted(Task),
    Filtered(Selector),
    /// Blank submission or unknown id; nothing changed.
    Ignored,
}

/// One session: a task store plus the view it keeps in sync.
pub struct App<S: KeyValueStore, V: ViewLayer> {
    store: TaskStore<S>,
    sync: ViewSync,
    view: V,
}

impl<S: KeyValueStore, V: ViewLayer> App<S, V> {
    #[tracing::instrument(skip_all)]
    pub fn open(persistence: Persistence<S>, mut view: V, removal_delay: Duration) -> Self {
        let store = TaskStore::open(persistence);
        let mut sync = ViewSync::new(removal_delay);
        sync.sync_all(store.all(), &mut view);
        info!(count = store.len(), "session opened");
        Self { store, sync, view }
    }

    pub fn handle(&mut self, event: ViewEvent) -> Outcome {
        self.handle_at(event, Utc::now())
    }

    #[tracing::instrument(skip(self, now))]
    pub fn handle_at(&mut self, event: ViewEvent, now: DateTime<Utc>) -> Outcome {
        let outcome = match event {
            ViewEvent::Submit {
                text,
                category,
                priority,
            } => match self.store.create_at(&text, category, priority, now) {
                Some(task) => {
                    self.sync.task_added(&task, self.store.all(), &mut self.view);
                    Outcome::Created(task)
                }
                None => Outcome::Ignored,
            },
            ViewEvent::Toggle(id) => match self.store.toggle(&id) {
                Some(completed) => {
                    if let Some(task) = self.store.get(&id) {
                        self.sync.task_toggled(task, self.store.all(), &mut self.view);
                    }
                    Outcome::Toggled { id, completed }
                }
                None => Outcome::Ignored,
            },
            ViewEvent::Delete(id) => {
                let removed = self.store.delete(&id);
                self.sync
                    .task_deleted(&id, self.store.all(), &mut self.view, now);
                match removed {
                    Some(task) => Outcome::Deleted(task),
                    None => Outcome::Ignored,
                }
            }
            ViewEvent::Filter(selector) => {
                self.sync
                    .set_filter(selector.clone(), self.store.all(), &mut self.view);
                Outcome::Filtered(selector)
            }
        };
        debug!(?outcome, "handled view event");
        outcome
    }

    /// Advances deferred view work (pending removals) to `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> usize {
        self.sync.tick(now, &mut self.view)
    }

    pub fn store(&self) -> &TaskStore<S> {
        &self.store
    }

    pub fn sync(&self) -> &ViewSync {
        &self.sync
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Completes pending removals, writes final state and returns the
    /// storage backend and view.
    #[tracing::instrument(skip_all)]
    pub fn dispose(mut self) -> (S, V) {
        self.sync.flush(&mut self.view);
        let kv = self.store.dispose();
        info!("session disposed");
        (kv, self.view)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::kv::MemoryKvStore;
    use crate::render::Renderer;
    use crate::summary::Summary;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap()
    }

    fn open(kv: MemoryKvStore) -> App<MemoryKvStore, Renderer> {
        App::open(
            Persistence::new(kv),
            Renderer::with_color(false),
            Duration::milliseconds(300),
        )
    }

    fn submit(text: &str, category: Category, priority: Priority) -> ViewEvent {
        ViewEvent::Submit {
            text: text.to_string(),
            category,
            priority,
        }
    }

    #[test]
    fn scenario_summary_and_filter() {
        let mut app = open(MemoryKvStore::new());
        let Outcome::Created(a) =
            app.handle_at(submit("Buy milk", Category::Personal, Priority::Low), now())
        else {
            panic!("expected created");
        };
        let Outcome::Created(b) =
            app.handle_at(submit("Ship release", Category::Work, Priority::High), now())
        else {
            panic!("expected created");
        };

        assert_eq!(
            app.view().summary(),
            Summary {
                completed: 0,
                active: 2,
                high_priority_active: 1,
            }
        );

        assert_eq!(
            app.handle_at(ViewEvent::Toggle(b.id.clone()), now()),
            Outcome::Toggled {
                id: b.id.clone(),
                completed: true,
            }
        );
        assert_eq!(
            app.view().summary(),
            Summary {
                completed: 1,
                active: 1,
                high_priority_active: 0,
            }
        );

        app.handle_at(ViewEvent::Filter(Selector::parse("work")), now());
        assert_eq!(app.view().visible_ids(), vec![b.id.as_str()]);
        assert_eq!(app.sync().filter(), &Selector::Category(Category::Work));

        app.handle_at(ViewEvent::Filter(Selector::All), now());
        assert_eq!(app.view().visible_ids(), vec![a.id.as_str(), b.id.as_str()]);
    }

    #[test]
    fn blank_submit_is_ignored() {
        let mut app = open(MemoryKvStore::new());
        assert_eq!(
            app.handle_at(submit("  ", Category::Work, Priority::Low), now()),
            Outcome::Ignored
        );
        assert!(app.store().is_empty());
    }

    #[test]
    fn delete_is_immediate_in_store_and_deferred_in_view() {
        let mut app = open(MemoryKvStore::new());
        app.handle_at(submit("a", Category::Work, Priority::Low), now());

        let outcome = app.handle_at(ViewEvent::Delete("task1".to_string()), now());
        assert!(matches!(outcome, Outcome::Deleted(_)));
        assert!(app.store().is_empty());
        assert!(app.view().has_row("task1"));
        assert_eq!(app.view().summary().active, 0);

        assert_eq!(
            app.handle_at(ViewEvent::Toggle("task1".to_string()), now()),
            Outcome::Ignored
        );
        assert_eq!(
            app.handle_at(ViewEvent::Delete("task1".to_string()), now()),
            Outcome::Ignored
        );
        assert!(!app.view().has_row("task1"));
        assert_eq!(app.tick(now() + Duration::seconds(1)), 0);
    }

    #[test]
    fn tick_finalizes_removal_after_delay() {
        let mut app = open(MemoryKvStore::new());
        app.handle_at(submit("a", Category::Work, Priority::Low), now());
        app.handle_at(ViewEvent::Delete("task1".to_string()), now());

        assert_eq!(app.tick(now() + Duration::milliseconds(299)), 0);
        assert!(app.view().has_row("task1"));
        assert_eq!(app.tick(now() + Duration::milliseconds(300)), 1);
        assert!(!app.view().has_row("task1"));
    }

    #[test]
    fn reload_renders_persisted_tasks_with_filter_reset() {
        let mut app = open(MemoryKvStore::new());
        app.handle_at(submit("Buy milk", Category::Personal, Priority::Low), now());
        app.handle_at(submit("Ship release", Category::Work, Priority::High), now());
        app.handle_at(ViewEvent::Filter(Selector::Completed), now());
        let (kv, _) = app.dispose();

        let mut reopened = open(kv);
        assert_eq!(reopened.sync().filter(), &Selector::All);
        assert_eq!(reopened.view().visible_ids(), vec!["task1", "task2"]);

        let Outcome::Created(c) =
            reopened.handle_at(submit("Plan trip", Category::Goals, Priority::Medium), now())
        else {
            panic!("expected created");
        };
        assert_eq!(c.id, "task3");
    }
}
