// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use warden_core::event::EventType;
use warden_core::run::{RunConfig, RunStatus};
use warden_core::test_support::{test_event, test_run_config, test_unit};
use warden_core::unit::UnitStatus;

fn config() -> RunConfig {
    test_run_config()
}

#[test]
fn create_run_round_trips() {
    let store = Store::open_in_memory().unwrap();
    let run = store.create_run(config(), 1_000).unwrap();
    assert_eq!(run.status, RunStatus::Running);

    let fetched = store.get_run(run.id).unwrap().expect("run should exist");
    assert_eq!(fetched.id, run.id);
    assert_eq!(fetched.config.target_branch, run.config.target_branch);
}

#[test]
fn duplicate_active_run_is_rejected() {
    let store = Store::open_in_memory().unwrap();
    let cfg = config();
    let run = store.create_run(cfg.clone(), 1_000).unwrap();
    store.update_run_status(run.id, RunStatus::Running, 1_001, None).unwrap();

    let err = store.create_run(cfg, 1_002).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateActiveRun { .. }));
}

#[test]
fn update_run_status_is_idempotent_for_terminal_status() {
    let store = Store::open_in_memory().unwrap();
    let run = store.create_run(config(), 1_000).unwrap();
    store.update_run_status(run.id, RunStatus::Running, 1_001, None).unwrap();
    store.update_run_status(run.id, RunStatus::Completed, 1_002, None).unwrap();
    // Writing the same terminal status twice is a no-op, not an error.
    store.update_run_status(run.id, RunStatus::Completed, 1_003, None).unwrap();

    let fetched = store.get_run(run.id).unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Completed);
    assert_eq!(fetched.completed_at_epoch_ms, Some(1_002));
}

#[test]
fn list_runs_by_status_is_the_resume_source_of_truth() {
    let store = Store::open_in_memory().unwrap();
    let a = store.create_run(RunConfig::builder("/tmp/a", "main").build(), 1_000).unwrap();
    let b = store.create_run(RunConfig::builder("/tmp/b", "main").build(), 1_000).unwrap();
    store.update_run_status(a.id, RunStatus::Running, 1_001, None).unwrap();
    store.update_run_status(b.id, RunStatus::Running, 1_001, None).unwrap();
    store.update_run_status(b.id, RunStatus::Completed, 1_002, None).unwrap();

    let running = store.list_runs_by_status(RunStatus::Running).unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, a.id);
}

#[test]
fn upsert_unit_inserts_then_updates() {
    let store = Store::open_in_memory().unwrap();
    let run = store.create_run(config(), 1_000).unwrap();
    let mut unit = test_unit(run.id, "unit-a", &[]);
    store.upsert_unit(run.id, &unit).unwrap();

    unit.transition(UnitStatus::Ready, 1_001, None, None).unwrap();
    store.upsert_unit(run.id, &unit).unwrap();

    let fetched = store.get_unit(run.id, unit.id()).unwrap().unwrap();
    assert_eq!(fetched.status, UnitStatus::Ready);
}

#[test]
fn get_units_for_run_orders_by_unit_id() {
    let store = Store::open_in_memory().unwrap();
    let run = store.create_run(config(), 1_000).unwrap();
    for id in ["b", "a", "c"] {
        store.upsert_unit(run.id, &test_unit(run.id, id, &[])).unwrap();
    }

    let units = store.get_units_for_run(run.id).unwrap();
    let ids: Vec<&str> = units.iter().map(|u| u.id().as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn append_event_assigns_dense_monotonic_sequence() {
    let store = Store::open_in_memory().unwrap();
    let run = store.create_run(config(), 1_000).unwrap();

    let e1 = store.append_event(test_event(run.id, EventType::OrchStarted)).unwrap();
    let e2 = store.append_event(test_event(run.id, EventType::UnitStarted)).unwrap();
    let e3 = store.append_event(test_event(run.id, EventType::OrchCompleted)).unwrap();

    assert_eq!([e1.sequence, e2.sequence, e3.sequence], [1, 2, 3]);
}

#[test]
fn sequences_are_independent_per_run() {
    let store = Store::open_in_memory().unwrap();
    let a = store.create_run(RunConfig::builder("/tmp/a", "main").build(), 1_000).unwrap();
    let b = store.create_run(RunConfig::builder("/tmp/b", "main").build(), 1_000).unwrap();

    let ea1 = store.append_event(test_event(a.id, EventType::OrchStarted)).unwrap();
    let eb1 = store.append_event(test_event(b.id, EventType::OrchStarted)).unwrap();
    let ea2 = store.append_event(test_event(a.id, EventType::OrchCompleted)).unwrap();

    assert_eq!(ea1.sequence, 1);
    assert_eq!(eb1.sequence, 1);
    assert_eq!(ea2.sequence, 2);
}

#[test]
fn list_events_since_returns_contiguous_suffix() {
    let store = Store::open_in_memory().unwrap();
    let run = store.create_run(config(), 1_000).unwrap();
    for _ in 0..5 {
        store.append_event(test_event(run.id, EventType::TaskRetry)).unwrap();
    }

    let since = store.list_events_since(run.id, 3).unwrap();
    let seqs: Vec<u64> = since.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, vec![3, 4, 5]);
}

#[test]
fn event_payload_and_error_round_trip() {
    let store = Store::open_in_memory().unwrap();
    let run = store.create_run(config(), 1_000).unwrap();
    let event = test_event(run.id, EventType::TaskValidationFail)
        .with_unit("unit-a")
        .with_task(warden_core::task::TaskOrdinal(1))
        .with_payload(serde_json::json!({"exit_code": 1}))
        .with_error("backpressure command failed");

    store.append_event(event).unwrap();
    let fetched = store.list_events_since(run.id, 1).unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].error.as_deref(), Some("backpressure command failed"));
    assert_eq!(fetched[0].payload, Some(serde_json::json!({"exit_code": 1})));
}

#[test]
fn reopening_the_same_file_preserves_events_across_a_simulated_crash() {
    let dir = tempfile::tempdir().unwrap();
    let path = Store::db_path(dir.path());

    {
        let store = Store::open(&path).unwrap();
        let run = store.create_run(config(), 1_000).unwrap();
        for _ in 0..3 {
            store.append_event(test_event(run.id, EventType::TaskCommitted)).unwrap();
        }
        // Dropped without an explicit close -- WAL mode must survive this.
    }

    let store = Store::open(&path).unwrap();
    let runs = store.list_runs_by_status(RunStatus::Running).unwrap();
    assert_eq!(runs.len(), 1);
    let events = store.list_events_since(runs[0].id, 1).unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
}
