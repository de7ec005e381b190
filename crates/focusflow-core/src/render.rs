use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::summary::{Summary, SummarySlot};
use crate::task::{Category, Priority, Task};
use crate::view::ViewLayer;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    id: String,
    text: String,
    category: Category,
    priority: Priority,
    completed: bool,
    visible: bool,
    removing: bool,
}

/// Terminal rendition of the task list: a row model kept in sync through
/// [`ViewLayer`] and printed as an aligned table with a summary panel.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    rows: Vec<Row>,
    summary: Summary,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self::with_color(cfg.get_bool("color").unwrap_or(true))
    }

    pub fn with_color(color: bool) -> Self {
        Self {
            color,
            rows: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Ids of rows currently shown, in display order.
    pub fn visible_ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|row| row.visible)
            .map(|row| row.id.as_str())
            .collect()
    }

    pub fn has_row(&self, id: &str) -> bool {
        self.rows.iter().any(|row| row.id == id)
    }

    #[tracing::instrument(skip(self, out), fields(rows = self.rows.len()))]
    pub fn write_to<W: Write>(&self, mut out: W) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Category".to_string(),
            "Priority".to_string(),
            "Done".to_string(),
            "Task".to_string(),
        ];

        let mut rows = Vec::new();
        for row in self.rows.iter().filter(|row| row.visible) {
            let priority = capitalize(row.priority.as_str());
            let priority = if row.priority == Priority::High && !row.completed {
                self.paint(&priority, "31")
            } else {
                priority
            };
            let text = if row.completed || row.removing {
                self.paint(&row.text, "2")
            } else {
                row.text.clone()
            };
            let done = if row.removing {
                "-".to_string()
            } else if row.completed {
                "x".to_string()
            } else {
                String::new()
            };

            rows.push(vec![
                self.paint(&row.id, "33"),
                capitalize(row.category.as_str()),
                priority,
                done,
                text,
            ]);
        }

        if rows.is_empty() {
            writeln!(out, "No tasks.")?;
        } else {
            write_table(&mut out, headers, rows)?;
        }

        writeln!(out)?;
        let panel = self
            .summary
            .slots()
            .map(|(slot, value)| format!("{slot} {value}"))
            .collect::<Vec<_>>()
            .join(" | ");
        writeln!(out, "{panel}")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

impl ViewLayer for Renderer {
    fn render_task(&mut self, task: &Task) {
        if let Some(row) = self.rows.iter_mut().find(|row| row.id == task.id) {
            row.text = task.text.clone();
            row.category = task.category.clone();
            row.priority = task.priority;
            row.completed = task.completed;
            return;
        }
        self.rows.push(Row {
            id: task.id.clone(),
            text: task.text.clone(),
            category: task.category.clone(),
            priority: task.priority,
            completed: task.completed,
            visible: true,
            removing: false,
        });
    }

    fn set_visible(&mut self, id: &str, visible: bool) {
        if let Some(row) = self.rows.iter_mut().find(|row| row.id == id) {
            row.visible = visible;
        }
    }

    fn begin_removal(&mut self, id: &str) {
        if let Some(row) = self.rows.iter_mut().find(|row| row.id == id) {
            row.removing = true;
        }
    }

    fn remove_task(&mut self, id: &str) {
        self.rows.retain(|row| row.id != id);
    }

    fn write_summary(&mut self, slot: SummarySlot, value: usize) {
        match slot {
            SummarySlot::Completed => self.summary.completed = value,
            SummarySlot::Active => self.summary.active = value,
            SummarySlot::HighPriorityActive => self.summary.high_priority_active = value,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
