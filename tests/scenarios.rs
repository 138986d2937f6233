// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios exercising `JobManager` directly against fakes,
//! asserting the exact `EventType` sequence a run produces rather than
//! just its final status (spec.md §8).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use warden_adapters::fakes::{FakeEscalator, FakeProvider, FakeRunner};
use warden_adapters::runner::CommandOutcome;
use warden_core::config::WardenConfig;
use warden_core::event::{Event, EventType};
use warden_core::run::{RunConfig, RunId, RunStatus};
use warden_core::task::{Task, TaskOrdinal, TaskStatus};
use warden_core::unit::UnitId;
use warden_core::{CoreError, FakeClock};
use warden_engine::spec_loader::{DiscoveredUnit, SpecLoadError, SpecLoader};
use warden_engine::{EngineError, JobManager};
use warden_storage::Store;

/// A fixed, in-memory unit/task layout -- no filesystem involved, so
/// these scenarios are about the orchestrator's event sequencing, not
/// spec-file parsing (already covered in `warden-engine`'s own tests).
#[derive(Default)]
struct FixedSpecLoader {
    units: Vec<DiscoveredUnit>,
}

impl FixedSpecLoader {
    fn new(units: Vec<DiscoveredUnit>) -> Self {
        Self { units }
    }
}

impl SpecLoader for FixedSpecLoader {
    fn discover_units(&self, _unit_spec_dir: &Path) -> Result<Vec<DiscoveredUnit>, SpecLoadError> {
        Ok(self.units.clone())
    }

    fn load_tasks(&self, unit_dir: &Path) -> Result<Vec<Task>, SpecLoadError> {
        let task = Task::new(TaskOrdinal(1), "trivial", unit_dir.join("1.md"), BTreeSet::new()).with_backpressure_command("check");
        Ok(vec![task])
    }

    fn task_status(&self, _spec_file: &Path) -> Result<TaskStatus, SpecLoadError> {
        // Every scenario here drives task completion through the
        // backpressure command outcome, not the spec-file marker.
        Ok(TaskStatus::Complete)
    }
}

fn unit(id: &str, depends_on: &[&str]) -> DiscoveredUnit {
    DiscoveredUnit {
        id: UnitId::new(id),
        depends_on: depends_on.iter().map(|d| UnitId::new(*d)).collect(),
        target_branch: None,
        baseline_commands: Vec::new(),
        review_enabled: false,
        // These scenarios assert exact event sequences against spec.md §8,
        // which documents the publish stage (push/PR/merge) as the
        // external collaborator boundary spec.md §1 places out of core
        // scope, not as part of the guaranteed event prefix.
        publish_enabled: false,
        dir: PathBuf::from(format!("/spec/{id}")),
    }
}

#[allow(clippy::type_complexity)]
fn make_manager(
    units: Vec<DiscoveredUnit>,
    config: &WardenConfig,
) -> (JobManager<FakeProvider, FakeRunner, FakeEscalator, FixedSpecLoader, FakeClock>, FakeProvider, FakeRunner, Store) {
    let provider = FakeProvider::new();
    let runner = FakeRunner::new();
    let escalator = FakeEscalator::new();
    let spec_loader = std::sync::Arc::new(FixedSpecLoader::new(units));
    let store = Store::open_in_memory().unwrap();
    let manager =
        JobManager::new(store.clone(), std::sync::Arc::new(provider.clone()), std::sync::Arc::new(runner.clone()), std::sync::Arc::new(escalator), spec_loader, FakeClock::new(), config.clone());
    (manager, provider, runner, store)
}

fn run_config(workspace_root: &Path, parallelism: u32) -> RunConfig {
    RunConfig::builder(workspace_root.to_path_buf(), "main").parallelism(parallelism).build()
}

/// A scratch workspace root: `FakeRunner::create_workspace` really creates
/// `<root>/.warden/workspaces/...` on disk, so scenarios must never point
/// it at a literal absolute path.
fn scratch_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();
    dir
}

async fn wait_until_terminal<P, R, Esc, L, C>(manager: &JobManager<P, R, Esc, L, C>, run_id: RunId)
where
    P: warden_adapters::provider::Provider,
    R: warden_adapters::runner::Runner,
    Esc: warden_adapters::escalator::Escalator,
    L: SpecLoader,
    C: warden_core::clock::Clock + 'static,
{
    for _ in 0..400 {
        if let Ok(detail) = manager.get(run_id) {
            if detail.status.is_terminal() {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("run {run_id} did not reach a terminal status in time");
}

fn event_types(events: &[Event]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

/// S1 -- trivial success: one unit, one task, a backpressure command that
/// passes on the first try. The event log must match the documented
/// prefix exactly (there is nothing else to append once `orch.completed`
/// fires).
#[tokio::test]
async fn s1_trivial_success_produces_the_documented_event_prefix() {
    let config = WardenConfig::default();
    let (manager, _provider, runner, store) = make_manager(vec![unit("u", &[])], &config);
    runner.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });

    let repo = scratch_repo();
    let run_id = manager.start(run_config(repo.path(), 1)).await.unwrap();
    wait_until_terminal(&manager, run_id).await;

    let detail = manager.get(run_id).unwrap();
    assert_eq!(detail.status, RunStatus::Completed);

    let events = store.list_events_since(run_id, 1).unwrap();
    assert_eq!(
        event_types(&events),
        vec![
            EventType::OrchStarted,
            EventType::UnitStarted,
            EventType::TaskClaudeInvoke,
            EventType::TaskClaudeDone,
            EventType::TaskBackpressure,
            EventType::TaskValidationOk,
            EventType::TaskCommitted,
            EventType::TaskCompleted,
            EventType::UnitCompleted,
            EventType::OrchCompleted,
        ]
    );
}

/// S2 -- backpressure retry: the backpressure command fails on the first
/// invocation and passes on the second. Expect exactly one
/// `task.validation.fail` followed by `task.retry(attempt=1)`, and the
/// task accepted on the second outer round.
#[tokio::test]
async fn s2_backpressure_retry_succeeds_on_the_second_invocation() {
    let config = WardenConfig::default();
    let (manager, provider, runner, store) = make_manager(vec![unit("u", &[])], &config);
    runner.push_command_outcome(CommandOutcome { exit_code: 1, stdout: String::new(), stderr: "not ready".to_string() });
    runner.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });

    let repo = scratch_repo();
    let run_id = manager.start(run_config(repo.path(), 1)).await.unwrap();
    wait_until_terminal(&manager, run_id).await;

    let detail = manager.get(run_id).unwrap();
    assert_eq!(detail.status, RunStatus::Completed);
    assert_eq!(provider.invocation_count(), 2, "the agent must be invoked once per outer round");

    let events = store.list_events_since(run_id, 1).unwrap();
    let types = event_types(&events);
    let fail_pos = types.iter().position(|t| *t == EventType::TaskValidationFail).expect("expected one task.validation.fail");
    let retry_pos = types.iter().position(|t| *t == EventType::TaskRetry).expect("expected one task.retry");
    let completed_pos = types.iter().position(|t| *t == EventType::TaskCompleted).expect("task must eventually complete");
    assert!(fail_pos < retry_pos, "task.validation.fail must precede task.retry");
    assert!(retry_pos < completed_pos, "task.retry must precede the eventual task.completed");
    assert_eq!(types.iter().filter(|t| **t == EventType::TaskValidationFail).count(), 1);

    let retry_event = &events[retry_pos];
    assert_eq!(retry_event.payload.as_ref().and_then(|p| p.get("attempt")).and_then(|v| v.as_u64()), Some(1));
}

/// S3 -- dependency ordering: `b` depends on `a`; `unit.completed(a)`
/// must precede `unit.started(b)`.
#[tokio::test]
async fn s3_dependency_ordering_is_respected_in_the_event_log() {
    let config = WardenConfig::default();
    let (manager, _provider, runner, store) = make_manager(vec![unit("a", &[]), unit("b", &["a"])], &config);
    runner.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });
    runner.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });

    let repo = scratch_repo();
    let run_id = manager.start(run_config(repo.path(), 2)).await.unwrap();
    wait_until_terminal(&manager, run_id).await;
    assert_eq!(manager.get(run_id).unwrap().status, RunStatus::Completed);

    let events = store.list_events_since(run_id, 1).unwrap();
    let a_completed = events.iter().position(|e| e.event_type == EventType::UnitCompleted && e.unit.as_ref() == Some(&UnitId::new("a"))).unwrap();
    let b_started = events.iter().position(|e| e.event_type == EventType::UnitStarted && e.unit.as_ref() == Some(&UnitId::new("b"))).unwrap();
    assert!(a_completed < b_started, "unit.completed(a) must precede unit.started(b)");
}

/// S4 -- concurrency cap: parallelism=2, four independent units. Sample
/// `in_progress` unit counts while the run is live; the max observed must
/// never exceed the configured parallelism.
#[tokio::test]
async fn s4_concurrency_cap_is_never_exceeded() {
    let config = WardenConfig::default();
    let units = vec![unit("a", &[]), unit("b", &[]), unit("c", &[]), unit("d", &[])];
    let (manager, _provider, runner, _store) = make_manager(units, &config);
    for _ in 0..4 {
        runner.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });
    }

    let repo = scratch_repo();
    let run_id = manager.start(run_config(repo.path(), 2)).await.unwrap();

    let mut max_in_progress = 0usize;
    for _ in 0..400 {
        if let Ok(detail) = manager.get(run_id) {
            let in_progress = detail.units.iter().filter(|u| u.status == warden_core::unit::UnitStatus::InProgress).count();
            max_in_progress = max_in_progress.max(in_progress);
            if detail.status.is_terminal() {
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert!(max_in_progress <= 2, "observed {max_in_progress} concurrently in-progress units, expected at most 2");
    assert_eq!(manager.get(run_id).unwrap().status, RunStatus::Completed);
}

/// S6 -- cyclic DAG: `x` and `y` depend on each other. `StartJob` must
/// fail with a cycle error and create no run row.
#[tokio::test]
async fn s6_cyclic_dag_is_rejected_with_no_run_row_created() {
    let config = WardenConfig::default();
    let (manager, _provider, _runner, store) = make_manager(vec![unit("x", &["y"]), unit("y", &["x"])], &config);

    let repo = scratch_repo();
    let err = manager.start(run_config(repo.path(), 1)).await;
    match err {
        Err(EngineError::Core(CoreError::CyclicDag(members))) => {
            let mut members = members;
            members.sort();
            assert_eq!(members, vec!["x".to_string(), "y".to_string()]);
        }
        other => panic!("expected a cyclic-dag error, got {other:?}"),
    }

    for status in [RunStatus::Pending, RunStatus::Running, RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
        assert!(store.list_runs_by_status(status).unwrap().is_empty(), "no run row should exist for a rejected cyclic DAG");
    }
}

/// S5 -- crash + resume: start a two-unit run, then simulate the daemon
/// dying right after `a` completes and `b` is picked up -- the run and
/// `b`'s row are forced back to `running`/`in_progress` with a workspace
/// path that no longer exists on disk, standing in for a `kill -9` that
/// lands after the row is persisted but before `b`'s work is done. A
/// fresh `JobManager` over the same store, as `wardend` would construct
/// on restart, must pick the run back up via `resume_jobs` and drive it
/// to completion, and the event log must stay one contiguous, gap-free
/// sequence across the restart (spec.md §8, S5).
#[tokio::test]
async fn s5_crash_and_resume_continues_a_single_contiguous_event_sequence() {
    let config = WardenConfig::default();
    let (manager, provider, runner, store) = make_manager(vec![unit("a", &[]), unit("b", &["a"])], &config);
    runner.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });
    runner.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });
    provider.push_success(0);
    provider.push_success(0);

    let repo = scratch_repo();
    let run_id = manager.start(run_config(repo.path(), 1)).await.unwrap();
    wait_until_terminal(&manager, run_id).await;
    assert_eq!(manager.get(run_id).unwrap().status, RunStatus::Completed);
    let sequence_before_restart = store.list_events_since(run_id, 1).unwrap().len() as u64;

    // Force the persisted run and `b`'s row back into `running`/`in_progress`
    // with a workspace path that no longer exists -- the daemon crashed
    // after `b` had already picked up work but before it landed on disk.
    store.update_run_status(run_id, RunStatus::Running, 1, None).unwrap();
    let mut unit_b = store.get_unit(run_id, &UnitId::new("b")).unwrap().unwrap();
    unit_b.status = warden_core::unit::UnitStatus::InProgress;
    unit_b.workspace_path = Some(repo.path().join(".warden/workspaces/gone"));
    store.upsert_unit(run_id, &unit_b).unwrap();

    // A fresh `JobManager` over the same store, as `wardend` would
    // construct on restart.
    let provider2 = FakeProvider::new();
    let runner2 = FakeRunner::new();
    runner2.push_command_outcome(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });
    provider2.push_success(0);
    let escalator2 = FakeEscalator::new();
    let spec_loader2 = std::sync::Arc::new(FixedSpecLoader::new(vec![unit("a", &[]), unit("b", &["a"])]));
    let manager2 = JobManager::new(
        store.clone(),
        std::sync::Arc::new(provider2),
        std::sync::Arc::new(runner2),
        std::sync::Arc::new(escalator2),
        spec_loader2,
        FakeClock::new(),
        config,
    );

    let resumed = manager2.resume_jobs().await;
    assert_eq!(resumed, vec![run_id], "the running run must be picked back up on resume");
    wait_until_terminal(&manager2, run_id).await;

    assert_eq!(manager2.get(run_id).unwrap().status, RunStatus::Completed);
    let events_after = store.list_events_since(run_id, 1).unwrap();
    assert!(events_after.len() as u64 > sequence_before_restart, "resume must append further events, not replace them");
    let sequences: Vec<u64> = events_after.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
    assert_eq!(sequences, expected, "sequence numbers must stay dense and contiguous across the restart");
}
