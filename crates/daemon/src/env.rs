// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Deliberately small next to the teacher's `oj-daemon::env` -- no
//! `OJ_TCP_PORT`/`OJ_AUTH_TOKEN` equivalents, since remote/cross-host
//! access and client/daemon authentication are both spec.md §1 Non-goals.

use std::path::PathBuf;
use std::time::Duration;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the daemon's own state directory: `WARDEN_STATE_DIR` >
/// `XDG_STATE_HOME/warden` > `~/.local/state/warden`. Used only when a run
/// is started without an explicit `state_dir` override -- per-run state
/// normally lives under the workspace root instead (Open Question 2,
/// SPEC_FULL.md §3).
pub fn default_state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("WARDEN_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("warden"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/warden"))
}

/// How long `StopAll` waits for workers to observe cancellation before
/// proceeding with the rest of the shutdown sequence (spec.md §4.5: "wait
/// bounded (10 s)").
pub fn shutdown_drain_timeout() -> Duration {
    std::env::var("WARDEN_SHUTDOWN_DRAIN_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}
