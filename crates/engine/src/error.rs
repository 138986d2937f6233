// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crate-wide error type for `warden-engine`, wrapping every capability's
//! own error type plus the scheduler/unit-state failures from `warden-core`.

use warden_adapters::escalator::EscalatorError;
use warden_adapters::provider::ProviderError;
use warden_adapters::runner::RunnerError;
use warden_core::error::CoreError;
use warden_core::run::RunId;
use warden_core::unit::UnitId;
use warden_storage::error::StoreError;

use crate::spec_loader::SpecLoadError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Escalator(#[from] EscalatorError),

    #[error(transparent)]
    SpecLoad(#[from] SpecLoadError),

    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    #[error("worker for unit {0} was cancelled")]
    Cancelled(UnitId),

    #[error("unit {unit} failed: {message}")]
    UnitFailed { unit: UnitId, message: String },

    #[error("job {0} not found")]
    JobNotFound(RunId),

    #[error("at capacity: {active}/{cap} active jobs")]
    AtCapacity { active: usize, cap: usize },

    #[error("workspace root {0} does not look like a git repository")]
    NotAGitRepo(std::path::PathBuf),

    #[error("invariant violated for unit {unit}: {detail}")]
    Invariant { unit: UnitId, detail: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
