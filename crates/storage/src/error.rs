// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type for the persistence store.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to (de)serialize stored value: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a run is already active for workspace {workspace_root:?} on branch {target_branch:?}")]
    DuplicateActiveRun { workspace_root: String, target_branch: String },

    #[error("run {0} not found")]
    RunNotFound(String),

    #[error("unit {unit_id} not found in run {run_id}")]
    UnitNotFound { run_id: String, unit_id: String },

    #[error("stored row had unrecognized status {0:?}")]
    UnknownStatus(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
