use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ID_PREFIX: &str = "task";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Priority::Low),
            "m" | "medium" => Ok(Priority::Medium),
            "h" | "high" => Ok(Priority::High),
            other => Err(anyhow!("invalid priority: {other} (expected low, medium or high)")),
        }
    }
}

/// Task grouping. The three built-in categories get their own variants;
/// anything else is carried by name so new categories need no code change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Work,
    Personal,
    Goals,
    Custom(String),
}

impl Category {
    pub fn builtin() -> [Category; 3] {
        [Category::Work, Category::Personal, Category::Goals]
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Goals => "goals",
            Category::Custom(name) => name,
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        let name = value.trim().to_ascii_lowercase();
        match name.as_str() {
            "work" => Category::Work,
            "personal" => Category::Personal,
            "goals" => Category::Goals,
            _ => Category::Custom(name),
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::from(value.as_str())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        match value {
            Category::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub text: String,

    pub category: Category,

    pub priority: Priority,

    #[serde(default)]
    pub completed: bool,

    /// Milliseconds since the Unix epoch; `0` when the record predates the field.
    #[serde(default)]
    pub created_at: i64,
}

impl Task {
    pub fn new(
        number: u64,
        text: String,
        category: Category,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format_id(number),
            text,
            category,
            priority,
            completed: false,
            created_at: now.timestamp_millis(),
        }
    }

    pub fn number(&self) -> Option<u64> {
        id_number(&self.id)
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority == Priority::High
    }
}

pub fn format_id(number: u64) -> String {
    format!("{ID_PREFIX}{number}")
}

pub fn id_number(id: &str) -> Option<u64> {
    id.strip_prefix(ID_PREFIX)?.parse().ok()
}

/// Accepts either a full id (`task7`) or its bare number (`7`).
pub fn normalize_id(raw: &str) -> String {
    let raw = raw.trim();
    if raw.parse::<u64>().is_ok() {
        format!("{ID_PREFIX}{raw}")
    } else {
        raw.to_string()
    }
}
