//! Read-side projections over a task collection.
//!
//! # Responsibility
//! - Split tasks into pending/completed columns with display ordering.
//! - Compute summary counters.
//!
//! # Invariants
//! - Projections never mutate or drop tasks; every input task lands in
//!   exactly one column.

use crate::model::task::{Priority, Task};
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary counters for a task collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Pending task count per priority.
    pub by_priority: BTreeMap<Priority, usize>,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut by_priority: BTreeMap<Priority, usize> =
            Priority::ALL.iter().map(|priority| (*priority, 0)).collect();
        let mut completed = 0;

        for task in tasks {
            if task.completed {
                completed += 1;
            } else {
                *by_priority.entry(task.priority).or_insert(0) += 1;
            }
        }

        Self {
            total: tasks.len(),
            completed,
            pending: tasks.len() - completed,
            by_priority,
        }
    }
}

/// Tasks grouped the way the board view renders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBoard {
    /// Most urgent first; newest first within one priority.
    pub pending: Vec<Task>,
    /// Earliest completion first.
    pub completed: Vec<Task>,
    pub stats: TaskStats,
}

impl TaskBoard {
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let stats = TaskStats::from_tasks(&tasks);
        let (mut completed, mut pending): (Vec<Task>, Vec<Task>) =
            tasks.into_iter().partition(|task| task.completed);

        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        completed.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));

        Self {
            pending,
            completed,
            stats,
        }
    }
}
