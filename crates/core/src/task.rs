// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier and state machine.
//!
//! A task is the atomic agent-executable step inside a unit. Completion
//! requires two independent signals to agree: the on-disk spec-file marker
//! *and* a zero exit from the task's backpressure command.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Stable ordinal identifying a task within its unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskOrdinal(pub u32);

impl std::fmt::Display for TaskOrdinal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Complete => "complete",
        Failed => "failed",
    }
}

/// Atomic work item inside a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub ordinal: TaskOrdinal,
    pub title: String,
    pub spec_file: PathBuf,
    /// Shell command whose non-zero exit means the task is not yet done.
    /// `None` means the task is accepted on spec-marker flip alone.
    pub backpressure_command: Option<String>,
    /// Other task ordinals within the same unit that must be complete
    /// before this task is ready.
    pub depends_on: BTreeSet<TaskOrdinal>,
    pub status: TaskStatus,
    pub attempt: u32,
}

impl Task {
    pub fn new(
        ordinal: TaskOrdinal,
        title: impl Into<String>,
        spec_file: impl Into<PathBuf>,
        depends_on: BTreeSet<TaskOrdinal>,
    ) -> Self {
        Self {
            ordinal,
            title: title.into(),
            spec_file: spec_file.into(),
            backpressure_command: None,
            depends_on,
            status: TaskStatus::Pending,
            attempt: 0,
        }
    }

    pub fn with_backpressure_command(mut self, command: impl Into<String>) -> Self {
        self.backpressure_command = Some(command.into());
        self
    }

    /// A task is ready iff every dependency ordinal appears, in `complete`
    /// status, in `completed`, and the task itself hasn't started or
    /// finished yet.
    pub fn is_ready(&self, completed: &std::collections::HashSet<TaskOrdinal>) -> bool {
        self.status == TaskStatus::Pending && self.depends_on.iter().all(|d| completed.contains(d))
    }

    pub fn mark_in_progress(&mut self) {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::InProgress;
        }
        self.attempt += 1;
    }

    /// Accept the task as complete. Callers must have independently verified
    /// both the on-disk spec marker and a zero backpressure exit before
    /// calling this -- the completion probe abstraction that performs those
    /// two checks lives at the adapter boundary, not here.
    pub fn mark_complete(&mut self) {
        self.status = TaskStatus::Complete;
    }

    pub fn mark_failed(&mut self) {
        self.status = TaskStatus::Failed;
    }
}

/// Computes the ready set of a unit's tasks: those whose dependency
/// ordinals are all complete and which are themselves still pending.
pub fn ready_tasks(tasks: &[Task]) -> Vec<&Task> {
    let completed: std::collections::HashSet<TaskOrdinal> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Complete)
        .map(|t| t.ordinal)
        .collect();
    tasks.iter().filter(|t| t.is_ready(&completed)).collect()
}

/// Whether every task in the unit is complete.
pub fn all_complete(tasks: &[Task]) -> bool {
    tasks.iter().all(|t| t.status == TaskStatus::Complete)
}

/// Whether any task in the unit is failed.
pub fn any_failed(tasks: &[Task]) -> bool {
    tasks.iter().any(|t| t.status == TaskStatus::Failed)
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
