// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crate-wide error type for `warden-core`.
//!
//! Most state-machine violations are reported through their own narrow
//! error types ([`crate::run::RunTransitionError`],
//! [`crate::unit::UnitTransitionError`]) so callers can match on the
//! specific `from`/`to` pair; `CoreError` is the umbrella used where a
//! function needs to return any of them uniformly (for example a
//! `Scheduler::mark_*` dispatcher).

use crate::run::RunTransitionError;
use crate::unit::UnitTransitionError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    RunTransition(#[from] RunTransitionError),

    #[error(transparent)]
    UnitTransition(#[from] UnitTransitionError),

    #[error("invalid dag: cycle detected at {0:?}")]
    CyclicDag(Vec<String>),

    #[error("invalid dag: unit {unit} depends on unknown unit {missing}")]
    MissingDependency { unit: String, missing: String },

    #[error("no units ready but run is not complete -- contract violation (cyclic deps escaped Build() validation)")]
    SchedulerDeadlock,
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
