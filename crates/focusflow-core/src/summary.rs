use std::fmt;

use crate::task::Task;

/// Fixed display slots of the summary panel, in panel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummarySlot {
    Completed,
    Active,
    HighPriorityActive,
}

impl SummarySlot {
    pub const ALL: [SummarySlot; 3] = [
        SummarySlot::Completed,
        SummarySlot::Active,
        SummarySlot::HighPriorityActive,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SummarySlot::Completed => "Completed",
            SummarySlot::Active => "Active",
            SummarySlot::HighPriorityActive => "High priority",
        }
    }
}

impl fmt::Display for SummarySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub active: usize,
    pub high_priority_active: usize,
}

impl Summary {
    pub fn get(&self, slot: SummarySlot) -> usize {
        match slot {
            SummarySlot::Completed => self.completed,
            SummarySlot::Active => self.active,
            SummarySlot::HighPriorityActive => self.high_priority_active,
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = (SummarySlot, usize)> + '_ {
        SummarySlot::ALL
            .into_iter()
            .map(move |slot| (slot, self.get(slot)))
    }
}

pub fn summarize(tasks: &[Task]) -> Summary {
    let completed = tasks.iter().filter(|t| t.completed).count();
    let high_priority_active = tasks
        .iter()
        .filter(|t| t.is_high_priority() && !t.completed)
        .count();

    Summary {
        completed,
        active: tasks.len() - completed,
        high_priority_active,
    }
}
