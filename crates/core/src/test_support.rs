// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders and fixtures shared across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]` so that
//! `warden-storage`/`warden-engine` tests can depend on `warden-core` with
//! `features = ["test-support"]` instead of duplicating fixture
//! construction.

#![allow(clippy::unwrap_used)]

use crate::event::{Event, EventType};
use crate::run::{Run, RunConfig, RunId};
use crate::task::{Task, TaskOrdinal};
use crate::unit::{Unit, UnitId, UnitKey};
use std::collections::BTreeSet;
use std::path::PathBuf;

crate::builder! {
    pub struct TestTaskBuilder => Task {
        set { ordinal: TaskOrdinal = TaskOrdinal(1) }
        into { title: String = "do the thing" }
        into { spec_file: PathBuf = PathBuf::from("tasks/unit/1.md") }
        option { backpressure_command: String = None }
        computed { depends_on: BTreeSet<TaskOrdinal> = BTreeSet::new() }
        computed { status: crate::task::TaskStatus = crate::task::TaskStatus::Pending }
        computed { attempt: u32 = 0 }
    }
}

/// Build a minimal, valid [`RunConfig`] for tests that don't care about its
/// exact values.
pub fn test_run_config() -> RunConfig {
    RunConfig::builder("/tmp/warden-test-workspace", "main").build()
}

/// Build a fresh [`Run`] at a fixed timestamp.
pub fn test_run() -> Run {
    Run::new(test_run_config(), 1_000)
}

/// Build a fresh [`Unit`] with the given id and dependencies.
pub fn test_unit(run_id: RunId, id: &str, depends_on: &[&str]) -> Unit {
    Unit::new(
        UnitKey::new(run_id, UnitId::new(id)),
        depends_on.iter().map(|d| UnitId::new(*d)).collect(),
    )
}

/// Build a trivial single-task unit's task list: one ordinal, no
/// dependencies, backpressure `exit 0` -- the S1 scenario fixture.
pub fn trivial_task_list() -> Vec<Task> {
    vec![Task::new(TaskOrdinal(1), "trivial", "tasks/unit/1.md", BTreeSet::new())
        .with_backpressure_command("exit 0")]
}

/// Build an [`Event`] at a fixed timestamp, for tests asserting on shape
/// rather than exact wall-clock time.
pub fn test_event(run_id: RunId, event_type: EventType) -> Event {
    Event::new(run_id, event_type, chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap())
}

#[cfg(test)]
#[path = "test_support_tests.rs"]
mod tests;
