// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeSet;
use std::sync::Mutex;
use warden_adapters::fakes::{FakeEscalator, FakeProvider, FakeRunner};
use warden_core::effect::EscalationSeverity;
use warden_core::event::EventType;
use warden_core::run::RunId;
use warden_core::task::TaskOrdinal;
use warden_core::unit::UnitId;
use warden_storage::Store;

use crate::spec_loader::SpecLoadError;

/// A scripted [`SpecLoader`] that always returns the same status,
/// recording how many times it was asked.
#[derive(Default)]
struct FakeSpecLoader {
    status: Mutex<TaskStatus>,
    checks: Mutex<u32>,
}

impl FakeSpecLoader {
    fn new(status: TaskStatus) -> Self {
        Self { status: Mutex::new(status), checks: Mutex::new(0) }
    }

    fn checks(&self) -> u32 {
        *self.checks.lock().unwrap()
    }
}

impl SpecLoader for FakeSpecLoader {
    fn discover_units(&self, _unit_spec_dir: &std::path::Path) -> Result<Vec<crate::spec_loader::DiscoveredUnit>, SpecLoadError> {
        Ok(Vec::new())
    }

    fn load_tasks(&self, _unit_dir: &std::path::Path) -> Result<Vec<warden_core::task::Task>, SpecLoadError> {
        Ok(Vec::new())
    }

    fn task_status(&self, _spec_file: &std::path::Path) -> Result<TaskStatus, SpecLoadError> {
        *self.checks.lock().unwrap() += 1;
        Ok(*self.status.lock().unwrap())
    }
}

fn make_executor(
    status: TaskStatus,
) -> (Executor<FakeProvider, FakeRunner, FakeEscalator, FakeSpecLoader>, FakeProvider, FakeRunner, FakeEscalator, std::sync::Arc<FakeSpecLoader>) {
    let provider = FakeProvider::new();
    let runner = FakeRunner::new();
    let escalator = FakeEscalator::new();
    let spec_loader = std::sync::Arc::new(FakeSpecLoader::new(status));
    let bus = Bus::new(RunId::new(), Some(Store::open_in_memory().unwrap()));
    let executor = Executor::new(
        std::sync::Arc::new(provider.clone()),
        std::sync::Arc::new(runner.clone()),
        std::sync::Arc::new(escalator.clone()),
        spec_loader.clone(),
        bus,
        Duration::from_secs(60),
        std::path::PathBuf::from("/repo"),
    );
    (executor, provider, runner, escalator, spec_loader)
}

#[tokio::test]
async fn emit_dispatches_through_the_bus() {
    let (executor, ..) = make_executor(TaskStatus::Pending);
    let sub = executor.bus().subscribe(crate::bus::DropPolicy::OldestDrop);

    let event = Event::new(executor.bus().run_id(), EventType::OrchStarted, chrono::Utc::now());
    let outcome = executor.execute(Effect::Emit { event }, &CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, EffectOutcome::Event(_)));
    assert!(sub.recv().await.is_some());
}

#[tokio::test]
async fn invoke_provider_forwards_to_the_provider_and_returns_its_outcome() {
    let (executor, provider, ..) = make_executor(TaskStatus::Pending);
    provider.push_success(0);

    let effect = Effect::InvokeProvider {
        unit: UnitId::new("a"),
        prompt: "do the task".to_string(),
        workdir: std::path::PathBuf::from("/repo/a"),
        timeout: Duration::from_secs(5),
    };
    let outcome = executor.execute(effect, &CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, EffectOutcome::Provider(ProviderOutcome::Completed { exit_code: 0 })));
    assert_eq!(provider.invocation_count(), 1);
}

#[tokio::test]
async fn check_task_spec_marker_delegates_to_the_spec_loader() {
    let (executor, _provider, _runner, _escalator, spec_loader) = make_executor(TaskStatus::Complete);

    let effect = Effect::CheckTaskSpecMarker { unit: UnitId::new("a"), task: TaskOrdinal(1), spec_file: std::path::PathBuf::from("/repo/a/01.md") };
    let outcome = executor.execute(effect, &CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, EffectOutcome::TaskStatus(TaskStatus::Complete)));
    assert_eq!(spec_loader.checks(), 1);
}

#[tokio::test]
async fn commit_delegates_to_the_runner() {
    let (executor, _provider, runner, ..) = make_executor(TaskStatus::Pending);
    let effect = Effect::Commit { unit: UnitId::new("a"), workdir: std::path::PathBuf::from("/repo/a"), message: "feat: done".to_string() };
    executor.execute(effect, &CancellationToken::new()).await.unwrap();
    assert_eq!(runner.commits().len(), 1);
    assert_eq!(runner.commits()[0].1, "feat: done");
}

#[tokio::test]
async fn run_baseline_checks_reports_the_first_failure() {
    let (executor, _provider, runner, ..) = make_executor(TaskStatus::Pending);
    runner.push_command_outcome(warden_adapters::runner::CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });
    runner.push_command_outcome(warden_adapters::runner::CommandOutcome { exit_code: 1, stdout: String::new(), stderr: "lint failed".to_string() });

    let effect = Effect::RunBaselineChecks {
        unit: UnitId::new("a"),
        workdir: std::path::PathBuf::from("/repo/a"),
        commands: vec!["cargo fmt --check".to_string(), "cargo clippy".to_string()],
    };
    let outcome = executor.execute(effect, &CancellationToken::new()).await.unwrap();
    match outcome {
        EffectOutcome::Command(c) => {
            assert_eq!(c.exit_code, 1);
            assert_eq!(c.stderr, "lint failed");
        }
        other => panic!("expected Command outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn escalate_routes_through_the_escalator() {
    let (executor, _provider, _runner, escalator, _) = make_executor(TaskStatus::Pending);
    let effect = Effect::Escalate {
        unit: UnitId::new("a"),
        task: None,
        severity: EscalationSeverity::Blocking,
        message: "agent exhausted retries".to_string(),
    };
    executor.execute(effect, &CancellationToken::new()).await.unwrap();
    assert_eq!(escalator.notices().len(), 1);
}

#[tokio::test]
async fn open_pull_request_and_merge_pull_request_are_synthetic_no_ops() {
    let (executor, ..) = make_executor(TaskStatus::Pending);
    let open = Effect::OpenPullRequest {
        unit: UnitId::new("a"),
        branch: "unit/a-1".to_string(),
        target_branch: "main".to_string(),
        title: "a".to_string(),
        body: String::new(),
    };
    assert!(matches!(executor.execute(open, &CancellationToken::new()).await.unwrap(), EffectOutcome::None));

    let merge = Effect::MergePullRequest { unit: UnitId::new("a"), pr: 1 };
    assert!(matches!(executor.execute(merge, &CancellationToken::new()).await.unwrap(), EffectOutcome::None));
}

#[allow(dead_code)]
fn unused_imports_guard(_: BTreeSet<UnitId>) {}
