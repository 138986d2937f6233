// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-level fatal errors (spec.md §7 kind 5): DB open failure, socket
//! bind failure, PID lock conflict. Each maps to one of the small closed
//! set of process exit codes documented in SPEC_FULL.md §6.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to load config from {path}: {source}")]
    Config { path: PathBuf, #[source] source: toml::de::Error },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another wardend (pid {pid}) already holds the lock at {path}")]
    LockHeldByLivePeer { path: PathBuf, pid: i32 },

    #[error("failed to bind control socket at {path}: {source}")]
    BindFailed { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to open the store: {0}")]
    Store(#[from] warden_storage::error::StoreError),
}

impl DaemonError {
    /// The process exit code this error maps to (SPEC_FULL.md §6: "a small
    /// closed set, each documented at the call site").
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Config { .. } => 1,
            DaemonError::LockHeldByLivePeer { .. } => 2,
            DaemonError::Store(_) => 3,
            DaemonError::Io(_) | DaemonError::BindFailed { .. } => 1,
        }
    }
}
