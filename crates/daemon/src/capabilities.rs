// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The concrete capability set `wardend` wires `JobManager` with: the real
//! `git`-backed `Runner`, the `claude` CLI `Provider`, the terminal-log
//! `Escalator`, the filesystem `SpecLoader`, and the system clock. Every
//! other capability set (fakes, a webhook escalator) is equally
//! plug-compatible -- this is just the daemon's own choice of wiring, not
//! a structural requirement of `warden-engine`.

use std::sync::Arc;

use warden_adapters::escalator::TerminalEscalator;
use warden_adapters::provider::ClaudeCliProvider;
use warden_adapters::runner::GitRunner;
use warden_core::clock::SystemClock;
use warden_engine::spec_loader::FsSpecLoader;
use warden_engine::JobManager;

/// The daemon's production `JobManager` instantiation.
pub type WardenJobManager = JobManager<ClaudeCliProvider, GitRunner, TerminalEscalator, FsSpecLoader, SystemClock>;

pub fn build_job_manager(store: warden_storage::Store, config: warden_core::config::WardenConfig) -> WardenJobManager {
    JobManager::new(
        store,
        Arc::new(ClaudeCliProvider::default()),
        Arc::new(GitRunner::default()),
        Arc::new(TerminalEscalator),
        Arc::new(FsSpecLoader::new()),
        SystemClock,
        config,
    )
}
