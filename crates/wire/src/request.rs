// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-plane request surface (spec.md §6): `StartJob`, `StopJob`,
//! `GetJobStatus`, `ListJobs`, `WatchJob` (server-streaming), `Shutdown`,
//! `Health`, plus `Ping`/`Hello` for connection handshake and liveness
//! checks. Deliberately small -- this is the core engine's interface, not
//! the full CLI surface out of scope per spec.md §1.

use serde::{Deserialize, Serialize};
use warden_core::run::{RunConfig, RunId, RunStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Liveness probe; expects [`crate::Response::Pong`].
    Ping,

    /// Connection handshake; expects [`crate::Response::Hello`].
    Hello { client_version: String },

    /// Start a new run. Fails if the concurrency cap is reached or a
    /// duplicate active run exists for the same (workspace, branch).
    StartJob { config: RunConfig },

    /// Cancel a running job. Idempotent.
    StopJob { run_id: RunId },

    /// Fetch the current status and unit summaries of one run.
    GetJobStatus { run_id: RunId },

    /// List runs, optionally filtered to one status.
    ListJobs { status: Option<RunStatus> },

    /// Subscribe to a run's event stream. `from_seq = None` subscribes to
    /// live events only (no replay); `Some(seq)` replays persisted events
    /// from `seq` onward before switching to live delivery.
    WatchJob { run_id: RunId, from_seq: Option<u64> },

    /// Request an orderly daemon shutdown.
    Shutdown,

    /// Daemon health/version probe.
    Health,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
