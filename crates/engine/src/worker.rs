// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-unit inner loop (spec.md §4.4): workspace setup, the task ready-set
//! loop, baseline fix-up, advisory code review, and publish.
//!
//! The worker decides *what* happens next and hands each step to
//! [`crate::executor::Executor`] as an [`Effect`] -- it never touches a
//! subprocess, the filesystem, or git directly, which is what keeps this
//! module's decision logic exercisable against fakes start to finish.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use warden_adapters::escalator::Escalator;
use warden_adapters::provider::{Provider, ProviderOutcome};
use warden_adapters::runner::{RebaseOutcome, Runner};
use warden_adapters::{retry_with_backoff, BackoffError};
use warden_core::config::{MergePolicy, WardenConfig};
use warden_core::effect::{Effect, EscalationSeverity};
use warden_core::event::{Event, EventType};
use warden_core::retry::RetryConfig;
use warden_core::task::{all_complete, any_failed, ready_tasks, Task, TaskOrdinal, TaskStatus};
use warden_core::unit::{Unit, UnitId, UnitStatus};
use warden_core::Clock;

use warden_core::error::CoreError;

use crate::error::{EngineError, EngineResult};
use crate::executor::{EffectOutcome, Executor};
use crate::spec_loader::{DiscoveredUnit, SpecLoader};

/// Timeouts and retry-iteration caps the worker needs, lifted out of
/// [`WardenConfig`] so tests can construct a [`Worker`] without a full
/// config value.
#[derive(Debug, Clone)]
pub struct WorkerLimits {
    pub max_claude_retries: u32,
    pub max_baseline_retries: u32,
    pub max_fix_iterations: u32,
    pub agent_invoke_timeout: Duration,
    pub backpressure_timeout: Duration,
    pub retry: RetryConfig,
    pub merge_policy: MergePolicy,
}

impl WorkerLimits {
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            max_claude_retries: config.max_claude_retries,
            max_baseline_retries: config.max_baseline_retries,
            max_fix_iterations: config.max_fix_iterations,
            agent_invoke_timeout: config.agent_invoke_timeout,
            backpressure_timeout: config.backpressure_timeout,
            retry: config.retry,
            merge_policy: config.merge_policy,
        }
    }
}

/// One unit's work order: its current (already `in_progress`) domain
/// [`Unit`], the on-disk discovery record backing it, and the run-wide
/// defaults a unit may override.
#[derive(Debug, Clone)]
pub struct UnitJob {
    pub unit: Unit,
    pub discovered: DiscoveredUnit,
    pub repo_root: PathBuf,
    pub default_target_branch: String,
}

/// Terminal result of driving a unit through [`Worker::run_unit`]. Never
/// `Blocked` -- that status is the scheduler's to assign transitively, not
/// something a worker decides for its own unit.
#[derive(Debug)]
pub enum UnitOutcome {
    Completed(Unit),
    Failed(Unit),
}

/// Drives one unit's tasks from `in_progress` to a terminal state.
pub struct Worker<P, R, Esc, L, C> {
    executor: Executor<P, R, Esc, L>,
    spec_loader: Arc<L>,
    clock: C,
    limits: WorkerLimits,
}

impl<P, R, Esc, L, C> Worker<P, R, Esc, L, C>
where
    P: Provider,
    R: Runner,
    Esc: Escalator,
    L: SpecLoader,
    C: Clock,
{
    pub fn new(executor: Executor<P, R, Esc, L>, spec_loader: Arc<L>, clock: C, limits: WorkerLimits) -> Self {
        Self { executor, spec_loader, clock, limits }
    }

    /// Drive `job.unit` (expected to already be `in_progress`, per
    /// `Scheduler::mark_in_progress`) through workspace setup, the task
    /// loop, baseline fix-up, advisory review, and publish.
    #[tracing::instrument(skip(self, job, cancel), fields(unit = %job.unit.id()))]
    pub async fn run_unit(&self, mut job: UnitJob, cancel: &CancellationToken) -> EngineResult<UnitOutcome> {
        let unit_id = job.unit.id().clone();
        self.emit(EventType::UnitStarted, &unit_id, None).await;

        if let Err(message) = self.setup_workspace(&mut job, cancel).await {
            return self.fail_unit(job.unit, &unit_id, message, None, cancel).await;
        }

        let mut tasks = match self.spec_loader.load_tasks(&job.discovered.dir) {
            Ok(tasks) => tasks,
            Err(err) => return self.fail_unit(job.unit, &unit_id, format!("loading tasks: {err}"), None, cancel).await,
        };

        if let Err(message) = self.run_task_loop(&job, &mut tasks, cancel).await {
            return self.fail_unit(job.unit, &unit_id, message, None, cancel).await;
        }

        if let Err(message) = self.run_baseline_fixup(&job, cancel).await {
            return self.fail_unit(job.unit, &unit_id, message, None, cancel).await;
        }

        // Advisory: exhausting its fix-iteration budget never fails the unit.
        self.run_advisory_review(&job, cancel).await;

        // Push/PR/merge talk to an external forge collaborator that spec.md
        // §1 places out of core scope; a unit opts into it explicitly
        // (`DiscoveredUnit::publish_enabled`, default `true` for a real
        // unit-spec directory) rather than it running unconditionally.
        if job.discovered.publish_enabled {
            if let Err(message) = self.publish(&job, cancel).await {
                return self.fail_unit(job.unit, &unit_id, message, None, cancel).await;
            }
        }

        let epoch_ms = self.clock.epoch_ms();
        job.unit.transition(UnitStatus::Complete, epoch_ms, None, None).map_err(CoreError::from)?;
        self.emit(EventType::UnitCompleted, &unit_id, None).await;
        Ok(UnitOutcome::Completed(job.unit))
    }

    async fn setup_workspace(&self, job: &mut UnitJob, cancel: &CancellationToken) -> Result<(), String> {
        let unit_id = job.unit.id().clone();
        let startup_epoch_ms = job.unit.started_at_epoch_ms.unwrap_or_else(|| self.clock.epoch_ms());
        let branch = job.unit.branch.clone().unwrap_or_else(|| Unit::derive_branch_name(&unit_id, startup_epoch_ms));
        let workspace_path = job
            .unit
            .workspace_path
            .clone()
            .unwrap_or_else(|| job.repo_root.join(".warden").join("workspaces").join(unit_id.as_str()));
        let start_point = job.discovered.target_branch.clone().unwrap_or_else(|| job.default_target_branch.clone());

        self.execute_with_retry(
            &unit_id,
            Effect::CreateWorkspace {
                unit: unit_id.clone(),
                workspace_path: workspace_path.clone(),
                repo_root: job.repo_root.clone(),
                branch: branch.clone(),
                start_point,
            },
            cancel,
        )
        .await
        .map_err(|e| e.to_string())?;

        job.unit.branch = Some(branch);
        job.unit.workspace_path = Some(workspace_path);
        Ok(())
    }

    /// The ready-set task loop (spec.md §4.4): each round presents every
    /// task currently in flight to the agent, then independently re-derives
    /// completion per task from the on-disk marker plus a zero backpressure
    /// exit -- never from the agent's own exit code.
    async fn run_task_loop(&self, job: &UnitJob, tasks: &mut Vec<Task>, cancel: &CancellationToken) -> Result<(), String> {
        let unit_id = job.unit.id().clone();
        let workdir = self.require_workspace_path(job).map_err(|e| e.to_string())?;

        let mut in_flight: HashSet<TaskOrdinal> = HashSet::new();
        let mut claude_attempt: u32 = 0;

        loop {
            for task in ready_tasks(tasks) {
                in_flight.insert(task.ordinal);
            }

            if in_flight.is_empty() {
                if all_complete(tasks) {
                    return Ok(());
                }
                if any_failed(tasks) {
                    return Err(format!("unit {unit_id}: one or more tasks failed"));
                }
                return Err(format!("unit {unit_id}: no tasks ready but the unit is not complete"));
            }

            claude_attempt += 1;
            if claude_attempt > self.limits.max_claude_retries {
                let mut ordinals: Vec<TaskOrdinal> = in_flight.iter().copied().collect();
                ordinals.sort();
                for ordinal in &ordinals {
                    if let Some(task) = tasks.iter_mut().find(|t| t.ordinal == *ordinal) {
                        task.mark_failed();
                    }
                    self.emit(EventType::TaskFailed, &unit_id, Some(*ordinal)).await;
                }
                return Err(format!(
                    "unit {unit_id}: exhausted {} agent invocation(s) with task(s) {ordinals:?} still incomplete",
                    self.limits.max_claude_retries
                ));
            }

            let mut ordinals: Vec<TaskOrdinal> = in_flight.iter().copied().collect();
            ordinals.sort();
            let frontier: Vec<&Task> = ordinals.iter().filter_map(|o| tasks.iter().find(|t| t.ordinal == *o)).collect();
            let prompt = build_task_prompt(&frontier);

            for ordinal in &ordinals {
                if let Some(task) = tasks.iter_mut().find(|t| t.ordinal == *ordinal) {
                    task.mark_in_progress();
                }
                self.emit(EventType::TaskClaudeInvoke, &unit_id, Some(*ordinal)).await;
            }

            self.execute_with_retry(
                &unit_id,
                Effect::InvokeProvider { unit: unit_id.clone(), prompt, workdir: workdir.clone(), timeout: self.limits.agent_invoke_timeout },
                cancel,
            )
            .await
            .map_err(|e| e.to_string())?;

            for ordinal in &ordinals {
                self.emit(EventType::TaskClaudeDone, &unit_id, Some(*ordinal)).await;
            }

            for ordinal in ordinals {
                self.recheck_task(&unit_id, &workdir, tasks, &mut in_flight, ordinal, cancel).await.map_err(|e| e.to_string())?;
            }
        }
    }

    /// Re-derive one in-flight task's completion: re-parse its spec file's
    /// status marker, then (if complete) run its backpressure command. Both
    /// must agree before the task is accepted.
    async fn recheck_task(
        &self,
        unit_id: &UnitId,
        workdir: &Path,
        tasks: &mut [Task],
        in_flight: &mut HashSet<TaskOrdinal>,
        ordinal: TaskOrdinal,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        let task_idx = tasks
            .iter()
            .position(|t| t.ordinal == ordinal)
            .ok_or_else(|| EngineError::Invariant { unit: unit_id.clone(), detail: format!("task #{ordinal} vanished from the loaded task list") })?;
        let spec_file = tasks[task_idx].spec_file.clone();

        let marker = self
            .execute_with_retry(unit_id, Effect::CheckTaskSpecMarker { unit: unit_id.clone(), task: ordinal, spec_file }, cancel)
            .await?;
        let status = match marker {
            EffectOutcome::TaskStatus(status) => status,
            _ => unreachable!("CheckTaskSpecMarker always returns EffectOutcome::TaskStatus"),
        };
        if status != TaskStatus::Complete {
            return Ok(());
        }

        let accepted = match tasks[task_idx].backpressure_command.clone() {
            None => true,
            Some(command) => {
                self.emit(EventType::TaskBackpressure, unit_id, Some(ordinal)).await;
                let outcome = self
                    .execute_with_retry(
                        unit_id,
                        Effect::RunBackpressure { unit: unit_id.clone(), task: ordinal, command, workdir: workdir.to_path_buf(), timeout: self.limits.backpressure_timeout },
                        cancel,
                    )
                    .await?;
                matches!(outcome, EffectOutcome::Command(c) if c.success())
            }
        };

        if accepted {
            self.emit(EventType::TaskValidationOk, unit_id, Some(ordinal)).await;
            let message = format!("feat({unit_id}): complete task #{ordinal} - {}", tasks[task_idx].title);
            self.execute_with_retry(unit_id, Effect::Commit { unit: unit_id.clone(), workdir: workdir.to_path_buf(), message }, cancel).await?;
            self.emit(EventType::TaskCommitted, unit_id, Some(ordinal)).await;
            tasks[task_idx].mark_complete();
            self.emit(EventType::TaskCompleted, unit_id, Some(ordinal)).await;
            in_flight.remove(&ordinal);
        } else {
            self.emit(EventType::TaskValidationFail, unit_id, Some(ordinal)).await;
            tasks[task_idx].mark_in_progress();
            self.emit_with_payload(EventType::TaskRetry, unit_id, Some(ordinal), serde_json::json!({ "attempt": tasks[task_idx].attempt })).await;
        }
        Ok(())
    }

    /// Bounded fix-up loop against the unit's baseline checks
    /// (format/lint/typecheck). Fatal once `max_baseline_retries` is spent.
    async fn run_baseline_fixup(&self, job: &UnitJob, cancel: &CancellationToken) -> Result<(), String> {
        if job.discovered.baseline_commands.is_empty() {
            return Ok(());
        }
        let unit_id = job.unit.id().clone();
        let workdir = self.require_workspace_path(job).map_err(|e| e.to_string())?;

        let mut attempt = 0u32;
        loop {
            let outcome = self
                .execute_with_retry(
                    &unit_id,
                    Effect::RunBaselineChecks { unit: unit_id.clone(), workdir: workdir.clone(), commands: job.discovered.baseline_commands.clone() },
                    cancel,
                )
                .await
                .map_err(|e| e.to_string())?;
            let command = match outcome {
                EffectOutcome::Command(c) => c,
                _ => unreachable!("RunBaselineChecks always returns EffectOutcome::Command"),
            };
            if command.success() {
                return Ok(());
            }

            attempt += 1;
            if attempt > self.limits.max_baseline_retries {
                return Err(format!("unit {unit_id}: baseline checks still failing after {attempt} attempt(s): {}", command.stderr));
            }

            let prompt = format!(
                "Baseline checks failed for this unit of work. Fix the issue so they pass.\n\nstdout:\n{}\n\nstderr:\n{}",
                command.stdout, command.stderr
            );
            let _ = self
                .execute_with_retry(&unit_id, Effect::InvokeProvider { unit: unit_id.clone(), prompt, workdir: workdir.clone(), timeout: self.limits.agent_invoke_timeout }, cancel)
                .await;
            self.execute_with_retry(&unit_id, Effect::Commit { unit: unit_id.clone(), workdir: workdir.clone(), message: format!("fix({unit_id}): baseline checks") }, cancel)
                .await
                .map_err(|e| e.to_string())?;
        }
    }

    /// Advisory code-review loop: invokes a reviewer (modeled as another
    /// agent invocation against a review prompt) up to `max_fix_iterations`
    /// times. Never fatal -- exhausting the budget just stops the loop.
    async fn run_advisory_review(&self, job: &UnitJob, cancel: &CancellationToken) {
        if !job.discovered.review_enabled {
            return;
        }
        let unit_id = job.unit.id().clone();
        let workdir = match self.require_workspace_path(job) {
            Ok(workdir) => workdir,
            Err(_) => return,
        };
        self.emit(EventType::ReviewRequested, &unit_id, None).await;

        for _ in 0..=self.limits.max_fix_iterations {
            let prompt = "Review the changes made in this workspace for correctness and style. \
                If there are no issues, make no changes and exit 0. Otherwise fix the issues directly."
                .to_string();
            let result = self
                .execute_with_retry(&unit_id, Effect::InvokeProvider { unit: unit_id.clone(), prompt, workdir: workdir.clone(), timeout: self.limits.agent_invoke_timeout }, cancel)
                .await;
            let clean = matches!(result, Ok(EffectOutcome::Provider(ProviderOutcome::Completed { exit_code: 0 })));
            if clean {
                self.emit(EventType::ReviewPassed, &unit_id, None).await;
                return;
            }
            self.emit(EventType::ReviewIssuesFound, &unit_id, None).await;
            let _ = self
                .execute_with_retry(&unit_id, Effect::Commit { unit: unit_id.clone(), workdir: workdir.clone(), message: format!("fix({unit_id}): address review feedback") }, cancel)
                .await;
        }
    }

    /// Push, open a (synthetic) pull request, then merge per the run's
    /// configured [`MergePolicy`].
    async fn publish(&self, job: &UnitJob, cancel: &CancellationToken) -> Result<(), String> {
        let unit_id = job.unit.id().clone();
        let workdir = self.require_workspace_path(job).map_err(|e| e.to_string())?;
        let branch = job
            .unit
            .branch
            .clone()
            .ok_or_else(|| EngineError::Invariant { unit: unit_id.clone(), detail: "branch not set before publish".into() }.to_string())?;
        let target_branch = job.discovered.target_branch.clone().unwrap_or_else(|| job.default_target_branch.clone());

        self.execute_with_retry(&unit_id, Effect::Push { unit: unit_id.clone(), workdir: workdir.clone(), branch: branch.clone() }, cancel)
            .await
            .map_err(|e| e.to_string())?;
        self.emit(EventType::GitPushed, &unit_id, None).await;

        self.execute_with_retry(
            &unit_id,
            Effect::OpenPullRequest { unit: unit_id.clone(), branch: branch.clone(), target_branch: target_branch.clone(), title: unit_id.to_string(), body: String::new() },
            cancel,
        )
        .await
        .map_err(|e| e.to_string())?;
        self.emit(EventType::PrOpened, &unit_id, None).await;

        match self.limits.merge_policy {
            MergePolicy::Local => self.merge_local(&unit_id, &workdir, &branch, &target_branch, cancel).await,
            MergePolicy::Forge => Err(format!("unit {unit_id}: merge_policy=forge has no implementation yet; escalating rather than silently falling back to a local merge")),
        }
    }

    async fn merge_local(&self, unit_id: &UnitId, workdir: &Path, branch: &str, target_branch: &str, cancel: &CancellationToken) -> Result<(), String> {
        let outcome = self
            .execute_with_retry(unit_id, Effect::RebaseOntoTarget { unit: unit_id.clone(), workdir: workdir.to_path_buf(), target_branch: target_branch.to_string() }, cancel)
            .await
            .map_err(|e| e.to_string())?;
        let rebase = match outcome {
            EffectOutcome::Rebase(r) => r,
            _ => unreachable!("RebaseOntoTarget always returns EffectOutcome::Rebase"),
        };

        if let RebaseOutcome::Conflict { files } = rebase {
            self.emit_with_payload(EventType::GitRebaseConflict, unit_id, None, serde_json::json!({ "files": files })).await;

            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let prompt = format!("Resolve the rebase conflicts onto {target_branch} in: {}. Continue the rebase once resolved.", files.join(", "));
                let _ = self
                    .execute_with_retry(unit_id, Effect::InvokeProvider { unit: unit_id.clone(), prompt, workdir: workdir.to_path_buf(), timeout: self.limits.agent_invoke_timeout }, cancel)
                    .await;

                let still_in_progress = match self
                    .execute_with_retry(unit_id, Effect::RebaseInProgress { unit: unit_id.clone(), workdir: workdir.to_path_buf() }, cancel)
                    .await
                    .map_err(|e| e.to_string())?
                {
                    EffectOutcome::Bool(b) => b,
                    _ => unreachable!("RebaseInProgress always returns EffectOutcome::Bool"),
                };
                if !still_in_progress {
                    self.emit(EventType::GitRebaseResolved, unit_id, None).await;
                    break;
                }
                if attempt >= self.limits.max_claude_retries {
                    let _ = self.execute_with_retry(unit_id, Effect::AbortRebase { unit: unit_id.clone(), workdir: workdir.to_path_buf() }, cancel).await;
                    self.emit(EventType::PrConflict, unit_id, None).await;
                    return Err(format!("unit {unit_id}: rebase conflict onto {target_branch} unresolved after {attempt} agent attempt(s): {}", files.join(", ")));
                }
            }
        }

        self.execute_with_retry(
            unit_id,
            Effect::MergeLocal { unit: unit_id.clone(), workdir: workdir.to_path_buf(), unit_branch: branch.to_string(), target_branch: target_branch.to_string() },
            cancel,
        )
        .await
        .map_err(|e| e.to_string())?;
        self.emit(EventType::PrApproved, unit_id, None).await;
        self.emit(EventType::PrMerged, unit_id, None).await;
        Ok(())
    }

    async fn fail_unit(&self, mut unit: Unit, unit_id: &UnitId, message: String, task: Option<TaskOrdinal>, cancel: &CancellationToken) -> EngineResult<UnitOutcome> {
        let _ = self
            .execute_with_retry(unit_id, Effect::Escalate { unit: unit_id.clone(), task, severity: EscalationSeverity::Blocking, message: message.clone() }, cancel)
            .await;
        self.emit_with_error(EventType::UnitFailed, unit_id, message.clone()).await;
        let epoch_ms = self.clock.epoch_ms();
        unit.transition(UnitStatus::Failed, epoch_ms, None, Some(message)).map_err(CoreError::from)?;
        Ok(UnitOutcome::Failed(unit))
    }

    /// `workspace_path` is assigned by [`Self::setup_workspace`] before any
    /// later stage runs; treat its absence as a broken invariant rather than
    /// panicking so a coding mistake surfaces as an escalated unit failure.
    fn require_workspace_path(&self, job: &UnitJob) -> EngineResult<PathBuf> {
        job.unit.workspace_path.clone().ok_or_else(|| EngineError::Invariant {
            unit: job.unit.id().clone(),
            detail: "workspace_path not set before this stage".into(),
        })
    }

    /// Run one effect through the executor, retrying transient failures per
    /// [`WorkerLimits::retry`] (spec.md §4.4: "every sub-invocation that may
    /// fail transiently ... uses exponential backoff").
    async fn execute_with_retry(&self, unit_id: &UnitId, effect: Effect, cancel: &CancellationToken) -> EngineResult<EffectOutcome> {
        retry_with_backoff(&self.limits.retry, cancel, |_attempt| {
            let effect = effect.clone();
            async move { self.executor.execute(effect, cancel).await }
        })
        .await
        .map_err(|err| match err {
            BackoffError::Cancelled { .. } => EngineError::Cancelled(unit_id.clone()),
            BackoffError::Exhausted { source, .. } => source,
        })
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.clock.epoch_ms() as i64).unwrap_or_else(chrono::Utc::now)
    }

    fn new_event(&self, event_type: EventType, unit: &UnitId, task: Option<TaskOrdinal>) -> Event {
        let mut event = Event::new(self.executor.bus().run_id(), event_type, self.now()).with_unit(unit.clone());
        if let Some(task) = task {
            event = event.with_task(task);
        }
        event
    }

    async fn emit(&self, event_type: EventType, unit: &UnitId, task: Option<TaskOrdinal>) {
        let event = self.new_event(event_type, unit, task);
        self.executor.bus().emit(event).await;
    }

    async fn emit_with_payload(&self, event_type: EventType, unit: &UnitId, task: Option<TaskOrdinal>, payload: serde_json::Value) {
        let event = self.new_event(event_type, unit, task).with_payload(payload);
        self.executor.bus().emit(event).await;
    }

    async fn emit_with_error(&self, event_type: EventType, unit: &UnitId, error: String) {
        let event = self.new_event(event_type, unit, None).with_error(error);
        self.executor.bus().emit(event).await;
    }
}

fn build_task_prompt(frontier: &[&Task]) -> String {
    let mut prompt = String::from(
        "You are completing one unit of work in an isolated git worktree. Pick exactly one of \
         the following ready tasks and implement it fully, flipping its status marker to \
         `complete` in its spec file once done:\n\n",
    );
    for task in frontier {
        prompt.push_str(&format!("- task #{} ({}): see {}\n", task.ordinal, task.title, task.spec_file.display()));
    }
    prompt
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
