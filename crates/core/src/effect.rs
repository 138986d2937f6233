// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects the worker and scheduler need performed by the outside world.
//!
//! Every side-effecting step of the inner loop is modeled as a value here
//! rather than called directly, so the worker's decision logic stays a pure
//! function of state and can be exercised without a real subprocess, git
//! checkout, or forge. An executor in `warden-adapters` interprets these
//! against the real `Provider`/`Runner` capabilities and turns the outcome
//! back into events.

use crate::event::Event;
use crate::task::TaskOrdinal;
use crate::unit::UnitId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Side effects the runtime executes on the worker's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Emit an event into the job's event bus.
    Emit { event: Event },

    /// Create the unit's isolated workspace: a worktree checked out onto a
    /// fresh branch (or an existing one, if resuming).
    CreateWorkspace {
        unit: UnitId,
        workspace_path: PathBuf,
        repo_root: PathBuf,
        branch: String,
        start_point: String,
    },

    /// Remove a unit's isolated workspace on success.
    RemoveWorkspace { unit: UnitId, workspace_path: PathBuf },

    /// Invoke the external coding agent with a prompt presenting the ready
    /// tasks of a unit.
    InvokeProvider {
        unit: UnitId,
        prompt: String,
        workdir: PathBuf,
        #[serde(with = "duration_millis")]
        timeout: Duration,
    },

    /// Re-parse a task's spec file on disk to check whether its status
    /// marker has flipped to complete.
    CheckTaskSpecMarker { unit: UnitId, task: TaskOrdinal, spec_file: PathBuf },

    /// Run a task's backpressure command in the unit's workspace.
    RunBackpressure {
        unit: UnitId,
        task: TaskOrdinal,
        command: String,
        workdir: PathBuf,
        #[serde(with = "duration_millis")]
        timeout: Duration,
    },

    /// Stage and commit all changes in the workspace.
    Commit { unit: UnitId, workdir: PathBuf, message: String },

    /// Run the unit's configured baseline checks (format/lint/typecheck).
    RunBaselineChecks { unit: UnitId, workdir: PathBuf, commands: Vec<String> },

    /// Push the unit's branch to the remote.
    Push { unit: UnitId, workdir: PathBuf, branch: String },

    /// Open a pull request for the unit's branch against the run's target
    /// branch.
    OpenPullRequest { unit: UnitId, branch: String, target_branch: String, title: String, body: String },

    /// Rebase the unit's branch onto the current target branch.
    RebaseOntoTarget { unit: UnitId, workdir: PathBuf, target_branch: String },

    /// Merge an approved pull request.
    MergePullRequest { unit: UnitId, pr: u64 },

    /// Merge a unit's branch onto the run's target branch directly (Open
    /// Question 3's `MergePolicy::Local` path), bypassing the forge
    /// entirely.
    MergeLocal { unit: UnitId, workdir: PathBuf, unit_branch: String, target_branch: String },

    /// Check whether a rebase is still in progress in the unit's workspace,
    /// after handing a conflict to the agent to resolve.
    RebaseInProgress { unit: UnitId, workdir: PathBuf },

    /// Abort an in-progress rebase, restoring the branch to its pre-rebase
    /// tip -- the worker's last resort once conflict-resolution retries are
    /// exhausted.
    AbortRebase { unit: UnitId, workdir: PathBuf },

    /// Escalate a persistent failure through the configured Escalator.
    Escalate { unit: UnitId, task: Option<TaskOrdinal>, severity: EscalationSeverity, message: String },
}

/// Severity attached to an escalation, driving which Escalator backends
/// fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationSeverity {
    Advisory,
    Blocking,
}

crate::simple_display! {
    EscalationSeverity {
        Advisory => "advisory",
        Blocking => "blocking",
    }
}

impl Effect {
    /// Effect name for log spans (e.g. "invoke_provider", "commit").
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Emit { .. } => "emit",
            Effect::CreateWorkspace { .. } => "create_workspace",
            Effect::RemoveWorkspace { .. } => "remove_workspace",
            Effect::InvokeProvider { .. } => "invoke_provider",
            Effect::CheckTaskSpecMarker { .. } => "check_task_spec_marker",
            Effect::RunBackpressure { .. } => "run_backpressure",
            Effect::Commit { .. } => "commit",
            Effect::RunBaselineChecks { .. } => "run_baseline_checks",
            Effect::Push { .. } => "push",
            Effect::OpenPullRequest { .. } => "open_pull_request",
            Effect::RebaseOntoTarget { .. } => "rebase_onto_target",
            Effect::MergePullRequest { .. } => "merge_pull_request",
            Effect::MergeLocal { .. } => "merge_local",
            Effect::RebaseInProgress { .. } => "rebase_in_progress",
            Effect::AbortRebase { .. } => "abort_rebase",
            Effect::Escalate { .. } => "escalate",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Emit { event } => vec![("event", event.log_summary())],
            Effect::CreateWorkspace { unit, workspace_path, branch, .. } => vec![
                ("unit", unit.to_string()),
                ("workspace_path", workspace_path.display().to_string()),
                ("branch", branch.clone()),
            ],
            Effect::RemoveWorkspace { unit, workspace_path } => vec![
                ("unit", unit.to_string()),
                ("workspace_path", workspace_path.display().to_string()),
            ],
            Effect::InvokeProvider { unit, workdir, .. } => {
                vec![("unit", unit.to_string()), ("workdir", workdir.display().to_string())]
            }
            Effect::CheckTaskSpecMarker { unit, task, .. } => {
                vec![("unit", unit.to_string()), ("task", task.to_string())]
            }
            Effect::RunBackpressure { unit, task, command, .. } => vec![
                ("unit", unit.to_string()),
                ("task", task.to_string()),
                ("command", command.clone()),
            ],
            Effect::Commit { unit, message, .. } => {
                vec![("unit", unit.to_string()), ("message", message.clone())]
            }
            Effect::RunBaselineChecks { unit, commands, .. } => {
                vec![("unit", unit.to_string()), ("commands", commands.join(" && "))]
            }
            Effect::Push { unit, branch, .. } => {
                vec![("unit", unit.to_string()), ("branch", branch.clone())]
            }
            Effect::OpenPullRequest { unit, branch, target_branch, .. } => vec![
                ("unit", unit.to_string()),
                ("branch", branch.clone()),
                ("target_branch", target_branch.clone()),
            ],
            Effect::RebaseOntoTarget { unit, target_branch, .. } => {
                vec![("unit", unit.to_string()), ("target_branch", target_branch.clone())]
            }
            Effect::MergePullRequest { unit, pr } => {
                vec![("unit", unit.to_string()), ("pr", pr.to_string())]
            }
            Effect::MergeLocal { unit, unit_branch, target_branch, .. } => vec![
                ("unit", unit.to_string()),
                ("unit_branch", unit_branch.clone()),
                ("target_branch", target_branch.clone()),
            ],
            Effect::RebaseInProgress { unit, .. } => vec![("unit", unit.to_string())],
            Effect::AbortRebase { unit, .. } => vec![("unit", unit.to_string())],
            Effect::Escalate { unit, severity, .. } => {
                vec![("unit", unit.to_string()), ("severity", severity.to_string())]
            }
        }
    }
}

/// Serde helper for `Duration` fields, represented on the wire as
/// milliseconds.
mod duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
