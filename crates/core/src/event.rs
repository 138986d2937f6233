// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event taxonomy and the durable event record.
//!
//! Every observable step of a run is recorded as one immutable [`Event`],
//! keyed by `(run_id, sequence)`. The event substrate (see the `bus` module
//! in `warden-engine`) assigns the sequence; this module only defines the
//! closed shape of what can be recorded.

use crate::run::RunId;
use crate::task::TaskOrdinal;
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};

/// Closed taxonomy of event kinds. Grouped by the five lifecycles named in
/// the data model: orchestrator, unit, task, PR, code-review, and git.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // orchestrator lifecycle
    OrchStarted,
    OrchCompleted,
    OrchFailed,

    // unit lifecycle
    UnitStarted,
    UnitCompleted,
    UnitFailed,
    UnitBlocked,

    // task lifecycle
    TaskClaudeInvoke,
    TaskClaudeDone,
    TaskBackpressure,
    TaskValidationOk,
    TaskValidationFail,
    TaskRetry,
    TaskCommitted,
    TaskCompleted,
    TaskFailed,

    // PR lifecycle
    PrOpened,
    PrApproved,
    PrMerged,
    PrConflict,

    // code-review lifecycle
    ReviewRequested,
    ReviewIssuesFound,
    ReviewPassed,

    // git lifecycle
    GitBranchCreated,
    GitPushed,
    GitRebaseConflict,
    GitRebaseResolved,

    // escalation, emitted across any of the above on retry exhaustion
    Escalated,
}

crate::simple_display! {
    EventType {
        OrchStarted => "orch.started",
        OrchCompleted => "orch.completed",
        OrchFailed => "orch.failed",
        UnitStarted => "unit.started",
        UnitCompleted => "unit.completed",
        UnitFailed => "unit.failed",
        UnitBlocked => "unit.blocked",
        TaskClaudeInvoke => "task.claude.invoke",
        TaskClaudeDone => "task.claude.done",
        TaskBackpressure => "task.backpressure",
        TaskValidationOk => "task.validation.ok",
        TaskValidationFail => "task.validation.fail",
        TaskRetry => "task.retry",
        TaskCommitted => "task.committed",
        TaskCompleted => "task.completed",
        TaskFailed => "task.failed",
        PrOpened => "pr.opened",
        PrApproved => "pr.approved",
        PrMerged => "pr.merged",
        PrConflict => "pr.conflict",
        ReviewRequested => "review.requested",
        ReviewIssuesFound => "review.issues_found",
        ReviewPassed => "review.passed",
        GitBranchCreated => "git.branch_created",
        GitPushed => "git.pushed",
        GitRebaseConflict => "git.rebase_conflict",
        GitRebaseResolved => "git.rebase_resolved",
        Escalated => "escalated",
    }
}

/// One durable, immutable record keyed by `(run_id, sequence)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: RunId,
    /// Monotonically increasing per-run sequence, starting at 1. Assigned
    /// by the persistence store at append time, never by the caller.
    pub sequence: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskOrdinal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    /// Build an event with sequence 0 -- the placeholder the store
    /// overwrites at append time. Never compare or persist an event with
    /// sequence 0 directly.
    pub fn new(run_id: RunId, event_type: EventType, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            run_id,
            sequence: 0,
            event_type,
            timestamp,
            unit: None,
            task: None,
            pr: None,
            payload: None,
            error: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<UnitId>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_task(mut self, task: TaskOrdinal) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_pr(mut self, pr: u64) -> Self {
        self.pr = Some(pr);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// One-line summary for structured log fields, deliberately terse since
    /// the full event (including payload) is already persisted.
    pub fn log_summary(&self) -> String {
        match (&self.unit, &self.task) {
            (Some(u), Some(t)) => format!("{}({},{})", self.event_type, u, t),
            (Some(u), None) => format!("{}({})", self.event_type, u),
            _ => self.event_type.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
