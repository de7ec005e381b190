use std::collections::BTreeSet;
use std::fmt;

use tracing::trace;

use crate::task::{
  Category,
  Task
};

/// View criterion for the task list. Not persisted.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
pub enum Selector {
  #[default]
  All,
  Active,
  Completed,
  Category(Category)
}

impl Selector {
  /// Any value that is not `all`, `active` or `completed` names a
  /// category, known or not.
  pub fn parse(raw: &str) -> Self {
    let value =
      raw.trim().to_ascii_lowercase();
    match value.as_str() {
      | "" | "all" => Selector::All,
      | "active" => Selector::Active,
      | "completed" => {
        Selector::Completed
      }
      | other => Selector::Category(
        Category::from(other)
      )
    }
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    let ok = match self {
      | Selector::All => true,
      | Selector::Active => {
        !task.completed
      }
      | Selector::Completed => {
        task.completed
      }
      | Selector::Category(category) => {
        &task.category == category
      }
    };
    trace!(id = %task.id, selector = %self, ok, "evaluated selector");
    ok
  }

  pub fn as_str(&self) -> &str {
    match self {
      | Selector::All => "all",
      | Selector::Active => "active",
      | Selector::Completed => {
        "completed"
      }
      | Selector::Category(category) => {
        category.as_str()
      }
    }
  }
}

impl fmt::Display for Selector {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[tracing::instrument(skip(tasks))]
pub fn visible(
  tasks: &[Task],
  selector: &Selector
) -> BTreeSet<String> {
  tasks
    .iter()
    .filter(|task| {
      selector.matches(task)
    })
    .map(|task| task.id.clone())
    .collect()
}

/// Same decision as [`visible`], keeping list order for rendering.
pub fn visible_tasks<'a>(
  tasks: &'a [Task],
  selector: &Selector
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      selector.matches(task)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    Selector,
    visible,
    visible_tasks
  };
  use crate::task::{
    Category,
    Priority,
    Task
  };

  fn tasks() -> Vec<Task> {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();
    let a = Task::new(
      1,
      "Buy milk".to_string(),
      Category::Personal,
      Priority::Low,
      now
    );
    let mut b = Task::new(
      2,
      "Ship release".to_string(),
      Category::Work,
      Priority::High,
      now
    );
    b.completed = true;
    let c = Task::new(
      3,
      "Run 5k".to_string(),
      Category::Goals,
      Priority::Medium,
      now
    );
    vec![a, b, c]
  }

  fn ids(
    values: &[&str]
  ) -> BTreeSet<String> {
    values
      .iter()
      .map(|v| v.to_string())
      .collect()
  }

  #[test]
  fn parse_recognizes_keywords_and_categories()
  {
    assert_eq!(
      Selector::parse("ALL"),
      Selector::All
    );
    assert_eq!(
      Selector::parse(""),
      Selector::All
    );
    assert_eq!(
      Selector::parse(" active "),
      Selector::Active
    );
    assert_eq!(
      Selector::parse("completed"),
      Selector::Completed
    );
    assert_eq!(
      Selector::parse("Work"),
      Selector::Category(
        Category::Work
      )
    );
    assert_eq!(
      Selector::parse("errands"),
      Selector::Category(
        Category::Custom(
          "errands".to_string()
        )
      )
    );
  }

  #[test]
  fn active_and_completed_partition_all()
  {
    let tasks = tasks();
    let all =
      visible(&tasks, &Selector::All);
    let active = visible(
      &tasks,
      &Selector::Active
    );
    let completed = visible(
      &tasks,
      &Selector::Completed
    );

    assert_eq!(
      all,
      ids(&["task1", "task2", "task3"])
    );
    assert!(
      active
        .is_disjoint(&completed)
    );
    assert_eq!(
      active
        .union(&completed)
        .cloned()
        .collect::<BTreeSet<_>>(),
      all
    );
  }

  #[test]
  fn category_filter_ignores_completion()
  {
    let mut tasks = tasks();
    let work = Selector::parse("work");
    assert_eq!(
      visible(&tasks, &work),
      ids(&["task2"])
    );

    tasks[1].completed = false;
    assert_eq!(
      visible(&tasks, &work),
      ids(&["task2"])
    );
  }

  #[test]
  fn unknown_category_matches_nothing()
  {
    let tasks = tasks();
    assert!(
      visible(
        &tasks,
        &Selector::parse("hobbies")
      )
      .is_empty()
    );
  }

  #[test]
  fn visible_tasks_keeps_list_order()
  {
    let tasks = tasks();
    let shown: Vec<&str> =
      visible_tasks(
        &tasks,
        &Selector::Active
      )
      .into_iter()
      .map(|t| t.id.as_str())
      .collect();
    assert_eq!(
      shown,
      vec!["task1", "task3"]
    );
  }
}
