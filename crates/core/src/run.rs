// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run identifier and state machine.
//!
//! A run is one orchestration job: a workspace root, a target branch, and
//! the DAG of units discovered under its unit-spec directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique, lexicographically sortable identifier for a run.
///
/// Backed by a UUIDv7 (timestamp + random bits), so `ORDER BY id` on the
/// `runs` table matches creation order without a separate `created_at`
/// index -- this is the "stable id (sortable, monotonically generated)"
/// invariant from the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a new run id, ordered after every previously generated id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Status of a run. Transitions are monotone toward a terminal state; once
/// terminal, no further state change is legal except through explicit
/// resume (only permitted from `Running`, representing a daemon restart
/// that found this run still marked active).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// Whether `self -> next` is a legal transition under the run state
    /// machine. Resume is modeled separately (`RunStatus::Running ->
    /// RunStatus::Running` is legal only as a no-op resume check, not as a
    /// transition out of a terminal state).
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Completed | Failed | Cancelled) => true,
            // idempotent re-write of the same terminal status is a no-op, not a transition
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

crate::simple_display! {
    RunStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Configuration captured when a run is started. Persisted (opaque to the
/// store) so `ResumeJobs` can relaunch an orchestrator without the caller
/// re-supplying anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub workspace_root: PathBuf,
    pub target_branch: String,
    pub unit_spec_dir: PathBuf,
    pub parallelism: u32,
}

impl RunConfig {
    pub fn builder(workspace_root: impl Into<PathBuf>, target_branch: impl Into<String>) -> RunConfigBuilder {
        RunConfigBuilder {
            workspace_root: workspace_root.into(),
            target_branch: target_branch.into(),
            unit_spec_dir: PathBuf::from("tasks"),
            parallelism: 1,
        }
    }
}

pub struct RunConfigBuilder {
    workspace_root: PathBuf,
    target_branch: String,
    unit_spec_dir: PathBuf,
    parallelism: u32,
}

impl RunConfigBuilder {
    crate::setters! {
        into {
            unit_spec_dir: PathBuf,
        }
        set {
            parallelism: u32,
        }
    }

    pub fn build(self) -> RunConfig {
        RunConfig {
            workspace_root: self.workspace_root,
            target_branch: self.target_branch,
            unit_spec_dir: self.unit_spec_dir,
            parallelism: self.parallelism.max(1),
        }
    }
}

/// A run instance, as tracked in memory and (via [`RunConfig`] plus status)
/// persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub config: RunConfig,
    pub status: RunStatus,
    pub started_at_epoch_ms: u64,
    pub completed_at_epoch_ms: Option<u64>,
    pub error: Option<String>,
}

impl Run {
    pub fn new(config: RunConfig, epoch_ms: u64) -> Self {
        Self {
            id: RunId::new(),
            config,
            status: RunStatus::Pending,
            started_at_epoch_ms: epoch_ms,
            completed_at_epoch_ms: None,
            error: None,
        }
    }

    /// Apply a status transition, rejecting illegal moves. Writing the same
    /// terminal status twice is a no-op (matches `UpdateRunStatus`'s
    /// idempotence contract).
    pub fn transition(&mut self, next: RunStatus, epoch_ms: u64, error: Option<String>) -> Result<(), RunTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(RunTransitionError {
                from: self.status,
                to: next,
            });
        }
        if self.status == next {
            return Ok(());
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at_epoch_ms = Some(epoch_ms);
            self.error = error;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal run transition: {from} -> {to}")]
pub struct RunTransitionError {
    pub from: RunStatus,
    pub to: RunStatus,
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
