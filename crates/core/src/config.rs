// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-wide configuration values.
//!
//! Pure data: parsing the TOML file and resolving the state directory
//! against the filesystem are the daemon crate's job, not this crate's.
//! Every "policy input, not a structural change" the Design Notes call out
//! (event retention, state-dir scope, merge routing) lives here as a field
//! with a concrete default rather than a hardcoded constant.

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where merging a unit's branch onto the run's target branch happens.
/// Open Question 3 from the Design Notes, resolved as a policy knob: local
/// git today, with a forge-routed option reserved for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    #[default]
    Local,
    Forge,
}

/// How long persisted events are retained. Open Question 1, resolved as a
/// policy knob: unbounded by default, with an optional cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventRetention {
    #[default]
    Forever,
    MaxEvents(u64),
    MaxDays(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Directory holding the SQLite database, PID file, and socket file.
    /// Open Question 2, resolved per-workspace-root by default: callers
    /// pass the workspace root and the daemon derives a `.warden/` state
    /// dir under it unless this is set explicitly.
    pub state_dir: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub default_parallelism: u32,
    /// Process-wide cap on concurrently active runs (spec.md §4.5: "refuses
    /// if active jobs >= cap"). Distinct from a single run's `parallelism`,
    /// which bounds concurrent units within that one run.
    pub max_active_runs: u32,
    pub retry: RetryConfig,
    #[serde(with = "duration_secs")]
    pub agent_invoke_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub backpressure_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub baseline_check_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub shutdown_grace_period: Duration,
    pub max_claude_retries: u32,
    pub max_baseline_retries: u32,
    pub max_fix_iterations: u32,
    pub event_retention: EventRetention,
    pub merge_policy: MergePolicy,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            socket_path: None,
            default_parallelism: 1,
            max_active_runs: 4,
            retry: RetryConfig::worker_default(),
            agent_invoke_timeout: Duration::from_secs(30 * 60),
            backpressure_timeout: Duration::from_secs(5 * 60),
            baseline_check_timeout: Duration::from_secs(10 * 60),
            shutdown_grace_period: Duration::from_secs(10),
            max_claude_retries: 3,
            max_baseline_retries: 3,
            max_fix_iterations: 3,
            event_retention: EventRetention::Forever,
            merge_policy: MergePolicy::Local,
        }
    }
}

impl WardenConfig {
    /// Resolve the effective state directory for a given workspace root,
    /// honoring an explicit override.
    pub fn resolve_state_dir(&self, workspace_root: &std::path::Path) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| workspace_root.join(".warden"))
    }

    pub fn resolve_socket_path(&self, workspace_root: &std::path::Path) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.resolve_state_dir(workspace_root).join("daemon.sock"))
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
