// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-engine: the scheduling, execution, and job-lifecycle layer.
//!
//! Everything here is dependency-injected over `warden-adapters`' traits
//! (`Provider`/`Runner`/`Escalator`) and `warden-core`'s `Clock` -- no
//! global mutable state, per the Design Notes. The event substrate
//! (`bus`), the per-run DAG (`scheduler`), the `Effect` interpreter
//! (`executor`), the per-unit inner loop (`worker`), and the process-wide
//! multiplexer (`job_manager`) compose bottom-up: `JobManager` owns one
//! `Orchestrator` per active run, each `Orchestrator` owns a `Scheduler`
//! and drives `Worker`s over it, each `Worker` drives `Effect`s through an
//! `Executor`.

pub mod bus;
pub mod error;
pub mod executor;
pub mod job_manager;
pub mod scheduler;
pub mod spec_loader;
pub mod worker;

pub use bus::{Bus, DropPolicy, Subscription};
pub use error::{EngineError, EngineResult};
pub use executor::{EffectOutcome, Executor};
pub use job_manager::{JobManager, Orchestrator};
pub use scheduler::Scheduler;
pub use spec_loader::{DiscoveredUnit, FsSpecLoader, SpecLoadError, SpecLoader};
pub use worker::{UnitJob, UnitOutcome, Worker, WorkerLimits};
