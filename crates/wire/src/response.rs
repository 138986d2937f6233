// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Responses to every [`crate::Request`] variant, including the framed
//! message sequence `WatchJob` streams until [`Response::JobTerminal`] or
//! connection close.

use serde::{Deserialize, Serialize};
use warden_core::event::Event;
use warden_core::run::{RunId, RunStatus};
use warden_core::unit::{UnitId, UnitStatus};

/// UI-shaped summary of one run, as returned by `ListJobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummaryPayload {
    pub run_id: RunId,
    pub status: RunStatus,
    pub workspace_root: String,
    pub target_branch: String,
    pub units_total: u32,
    pub units_complete: u32,
}

/// UI-shaped summary of one unit, nested in [`JobDetailPayload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSummaryPayload {
    pub unit_id: UnitId,
    pub status: UnitStatus,
    pub branch: Option<String>,
    pub error: Option<String>,
}

/// Full detail of one run, as returned by `GetJobStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetailPayload {
    pub run_id: RunId,
    pub status: RunStatus,
    pub workspace_root: String,
    pub target_branch: String,
    pub units: Vec<UnitSummaryPayload>,
    pub error: Option<String>,
}

/// Daemon health/version payload, as returned by `Health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthPayload {
    pub version: String,
    pub active_jobs: u32,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Hello { server_version: String },

    JobStarted { run_id: RunId },
    JobStopped { run_id: RunId },
    JobStatus { detail: JobDetailPayload },
    JobList { jobs: Vec<JobSummaryPayload> },

    /// One event delivered while watching a job. Streamed repeatedly for
    /// `WatchJob`; terminated by [`Response::JobTerminal`].
    JobEvent { event: Event },

    /// Sent once a watched run reaches a terminal status, then the
    /// connection is closed from the daemon side.
    JobTerminal { run_id: RunId, status: RunStatus },

    Health { health: HealthPayload },
    ShuttingDown,

    /// A request could not be fulfilled; `message` is the operator-facing
    /// description (the underlying typed error is logged server-side).
    Error { message: String },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
