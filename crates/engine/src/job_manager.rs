// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide job lifecycle (spec.md §4.5, §6).
//!
//! [`Orchestrator`] drives one run's [`Scheduler`] to completion: it owns
//! the single mutation point for that run's DAG, receiving unit outcomes
//! over an mpsc channel from spawned worker tasks rather than sharing the
//! scheduler behind a lock. [`JobManager`] is the daemon's one entry point
//! for starting, stopping, querying, and resuming runs; it holds a
//! [`LiveJob`] per non-terminal run (bus + cancellation token) and falls
//! back to the store for anything terminal -- the `LiveJob`/archived split
//! the Design Notes call for, expressed as "present in the map" vs. "not".

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use warden_adapters::escalator::Escalator;
use warden_adapters::provider::Provider;
use warden_adapters::runner::Runner;
use warden_core::config::WardenConfig;
use warden_core::error::CoreError;
use warden_core::event::{Event, EventType};
use warden_core::run::{Run, RunConfig, RunId, RunStatus};
use warden_core::unit::{Unit, UnitId, UnitKey, UnitStatus};
use warden_core::Clock;
use warden_storage::Store;
use warden_wire::response::{JobDetailPayload, JobSummaryPayload, UnitSummaryPayload};

use crate::bus::{Bus, DropPolicy, Subscription};
use crate::error::{EngineError, EngineResult};
use crate::executor::Executor;
use crate::scheduler::Scheduler;
use crate::spec_loader::{DiscoveredUnit, SpecLoader};
use crate::worker::{UnitJob, UnitOutcome, Worker, WorkerLimits};

/// Discover units under a fresh run's spec dir and validate the DAG
/// without persisting anything. `StartJob` must reject a cyclic DAG before
/// any row exists (spec.md §7: "no run row is created"), so this has to
/// run before `create_run_with_id`, not after.
fn discover_fresh<L: SpecLoader>(
    run_id: RunId,
    config: &RunConfig,
    spec_loader: &L,
    epoch_ms: u64,
) -> EngineResult<(Scheduler, HashMap<UnitId, DiscoveredUnit>)> {
    let unit_spec_dir = config.workspace_root.join(&config.unit_spec_dir);
    let discovered = spec_loader.discover_units(&unit_spec_dir)?;
    let units: Vec<Unit> =
        discovered.iter().map(|d| Unit::new(UnitKey::new(run_id, d.id.clone()), d.depends_on.clone())).collect();
    let scheduler = Scheduler::build(units, epoch_ms)?;
    let by_id = discovered.into_iter().map(|d| (d.id.clone(), d)).collect();
    Ok((scheduler, by_id))
}

fn discover_for_resume<L: SpecLoader>(config: &RunConfig, spec_loader: &L) -> EngineResult<HashMap<UnitId, DiscoveredUnit>> {
    let unit_spec_dir = config.workspace_root.join(&config.unit_spec_dir);
    let discovered = spec_loader.discover_units(&unit_spec_dir)?;
    Ok(discovered.into_iter().map(|d| (d.id.clone(), d)).collect())
}

/// Drives one run's [`Scheduler`] to completion. Owned by the tokio task
/// spawned for that run; never shared.
pub struct Orchestrator<P, R, Esc, L, C> {
    run_id: RunId,
    config: RunConfig,
    store: Store,
    bus: Bus,
    scheduler: Scheduler,
    discovered: HashMap<UnitId, DiscoveredUnit>,
    worker: Arc<Worker<P, R, Esc, L, C>>,
    clock: C,
    semaphore: Arc<Semaphore>,
}

impl<P, R, Esc, L, C> Orchestrator<P, R, Esc, L, C>
where
    P: Provider,
    R: Runner,
    Esc: Escalator,
    L: SpecLoader,
    C: Clock + 'static,
{
    #[allow(clippy::too_many_arguments)]
    fn new(
        run_id: RunId,
        config: RunConfig,
        store: Store,
        bus: Bus,
        scheduler: Scheduler,
        discovered: HashMap<UnitId, DiscoveredUnit>,
        provider: Arc<P>,
        runner: Arc<R>,
        escalator: Arc<Esc>,
        spec_loader: Arc<L>,
        clock: C,
        limits: WorkerLimits,
        baseline_timeout: std::time::Duration,
    ) -> Self {
        let executor =
            Executor::new(provider, runner, escalator, spec_loader.clone(), bus.clone(), baseline_timeout, config.workspace_root.clone());
        let parallelism = config.parallelism.max(1) as usize;
        let worker = Arc::new(Worker::new(executor, spec_loader, clock.clone(), limits));
        Self { run_id, config, store, bus, scheduler, discovered, worker, clock, semaphore: Arc::new(Semaphore::new(parallelism)) }
    }

    /// Drive every unit to a terminal state, then persist the run's
    /// terminal status and close the bus. Never panics; every failure
    /// along the way degrades to a logged error and a `failed` run rather
    /// than an unwound task, since nothing else observes this future's
    /// result except via the store and the bus it owns.
    async fn run(mut self, cancel: CancellationToken) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(UnitId, EngineResult<UnitOutcome>)>();
        let mut launched: std::collections::HashSet<UnitId> = std::collections::HashSet::new();

        for id in self.scheduler.in_progress() {
            self.launch(id.clone(), true, &tx, &cancel).await;
            launched.insert(id);
        }

        loop {
            let ready: Vec<UnitId> = self.scheduler.ready().into_iter().filter(|id| !launched.contains(id)).collect();
            for id in ready {
                self.launch(id.clone(), false, &tx, &cancel).await;
                launched.insert(id);
            }

            if self.scheduler.is_finished() {
                break;
            }
            if self.scheduler.is_deadlocked() {
                self.fail_run(CoreError::SchedulerDeadlock.to_string()).await;
                self.bus.close();
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => {
                    match msg {
                        Some((id, outcome)) => self.apply_outcome(id, outcome),
                        None => break,
                    }
                }
            }
        }

        // Drain outcomes from units already in flight before the loop exited
        // (finished, deadlocked, or cancelled) so their terminal status is
        // never lost.
        while let Ok((id, outcome)) = rx.try_recv() {
            self.apply_outcome(id, outcome);
        }

        if cancel.is_cancelled() {
            // `JobManager::stop` already wrote `cancelled` to the run row.
            self.bus.close();
            return;
        }

        if self.scheduler.all_complete() {
            let epoch_ms = self.clock.epoch_ms();
            let _ = self.store.update_run_status(self.run_id, RunStatus::Completed, epoch_ms, None);
            self.bus.emit(Event::new(self.run_id, EventType::OrchCompleted, chrono::Utc::now())).await;
        } else {
            self.fail_run("one or more units failed or were blocked".to_string()).await;
        }
        self.bus.close();
    }

    async fn fail_run(&self, message: String) {
        let epoch_ms = self.clock.epoch_ms();
        let _ = self.store.update_run_status(self.run_id, RunStatus::Failed, epoch_ms, Some(&message));
        self.bus.emit(Event::new(self.run_id, EventType::OrchFailed, chrono::Utc::now()).with_error(message)).await;
    }

    async fn launch(
        &mut self,
        id: UnitId,
        already_in_progress: bool,
        tx: &tokio::sync::mpsc::UnboundedSender<(UnitId, EngineResult<UnitOutcome>)>,
        cancel: &CancellationToken,
    ) {
        let epoch_ms = self.clock.epoch_ms();
        if !already_in_progress {
            let branch = Unit::derive_branch_name(&id, epoch_ms);
            if let Err(err) = self.scheduler.mark_in_progress(&id, epoch_ms, branch) {
                tracing::error!(unit = %id, error = %err, "failed to mark unit in_progress");
                return;
            }
        }
        let Some(unit) = self.scheduler.unit(&id).cloned() else {
            tracing::error!(unit = %id, "scheduled unit vanished from the scheduler");
            return;
        };
        if let Err(err) = self.store.upsert_unit(self.run_id, &unit) {
            tracing::error!(unit = %id, error = %err, "failed to persist in_progress unit");
        }
        // `Worker::run_unit` emits `UnitStarted` itself once it actually
        // begins driving the unit -- emitting it here too would double it.

        let Some(discovered) = self.discovered.get(&id).cloned() else {
            tracing::error!(unit = %id, "no discovered unit backing a scheduled id");
            return;
        };
        let job =
            UnitJob { unit, discovered, repo_root: self.config.workspace_root.clone(), default_target_branch: self.config.target_branch.clone() };

        let worker = self.worker.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let result = worker.run_unit(job, &cancel).await;
            drop(permit);
            let _ = tx.send((id, result));
        });
    }

    fn apply_outcome(&mut self, id: UnitId, outcome: EngineResult<UnitOutcome>) {
        let epoch_ms = self.clock.epoch_ms();
        match outcome {
            Ok(UnitOutcome::Completed(unit)) => {
                if let Err(err) = self.store.upsert_unit(self.run_id, &unit) {
                    tracing::error!(unit = %id, error = %err, "failed to persist completed unit");
                }
                if let Err(err) = self.scheduler.mark_complete(&id, epoch_ms) {
                    tracing::error!(unit = %id, error = %err, "scheduler rejected mark_complete");
                }
            }
            Ok(UnitOutcome::Failed(unit)) => {
                let message = unit.error.clone().unwrap_or_else(|| "unit failed".to_string());
                if let Err(err) = self.store.upsert_unit(self.run_id, &unit) {
                    tracing::error!(unit = %id, error = %err, "failed to persist failed unit");
                }
                if let Err(err) = self.scheduler.mark_failed(&id, epoch_ms, message) {
                    tracing::error!(unit = %id, error = %err, "scheduler rejected mark_failed");
                }
            }
            Err(err) => {
                if let Err(e) = self.scheduler.mark_failed(&id, epoch_ms, err.to_string()) {
                    tracing::error!(unit = %id, error = %e, "scheduler rejected mark_failed after worker error");
                }
            }
        }
    }
}

/// A run's live handle: bus for subscriptions, token to cancel it. Removed
/// from [`JobManager::jobs`] the instant its orchestrator task returns, at
/// which point the run is archived -- served entirely from the store.
struct LiveJob {
    bus: Bus,
    cancel: CancellationToken,
}

/// Process-wide multiplexer over every active and historical run.
///
/// Holds the capabilities every run's [`Orchestrator`] is built from, so
/// starting a job is just validating its DAG, persisting its initial rows,
/// and spawning -- no capability is ever constructed per-run.
pub struct JobManager<P, R, Esc, L, C> {
    store: Store,
    provider: Arc<P>,
    runner: Arc<R>,
    escalator: Arc<Esc>,
    spec_loader: Arc<L>,
    clock: C,
    config: WardenConfig,
    started_at_epoch_ms: u64,
    jobs: Arc<Mutex<HashMap<RunId, LiveJob>>>,
}

impl<P, R, Esc, L, C> JobManager<P, R, Esc, L, C>
where
    P: Provider,
    R: Runner,
    Esc: Escalator,
    L: SpecLoader,
    C: Clock + 'static,
{
    pub fn new(store: Store, provider: Arc<P>, runner: Arc<R>, escalator: Arc<Esc>, spec_loader: Arc<L>, clock: C, config: WardenConfig) -> Self {
        let started_at_epoch_ms = clock.epoch_ms();
        Self { store, provider, runner, escalator, spec_loader, clock, config, started_at_epoch_ms, jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn active_count(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.clock.epoch_ms().saturating_sub(self.started_at_epoch_ms) / 1_000
    }

    /// Start a new run: validate its DAG, persist it as `running`, and
    /// spawn its orchestrator. Refuses at the process-wide concurrency cap
    /// (spec.md §4.5) and on a cyclic DAG -- in neither case does a run row
    /// get created.
    pub async fn start(&self, config: RunConfig) -> EngineResult<RunId> {
        let active = self.active_count();
        let cap = self.config.max_active_runs as usize;
        if active >= cap {
            return Err(EngineError::AtCapacity { active, cap });
        }

        self.store.delete_inactive_run(&config.workspace_root, &config.target_branch)?;

        let run_id = RunId::new();
        let epoch_ms = self.clock.epoch_ms();
        let (scheduler, discovered) = discover_fresh(run_id, &config, self.spec_loader.as_ref(), epoch_ms)?;

        // Inserted directly as `running` (`Store::create_run_with_id`), so
        // the duplicate-active-run constraint fires right here rather than
        // on a later, separate status update.
        self.store.create_run_with_id(run_id, config.clone(), epoch_ms)?;
        for unit in scheduler.units() {
            self.store.upsert_unit(run_id, unit)?;
        }

        let bus = Bus::new(run_id, Some(self.store.clone()));
        bus.emit(Event::new(run_id, EventType::OrchStarted, chrono::Utc::now())).await;

        self.spawn(run_id, config, scheduler, discovered, bus);
        Ok(run_id)
    }

    /// Cancel a running job. Idempotent: stopping an already-terminal run
    /// is a no-op rather than an error.
    pub fn stop(&self, run_id: RunId) -> EngineResult<()> {
        let run = self.store.get_run(run_id)?.ok_or(EngineError::JobNotFound(run_id))?;
        if let Some(job) = self.jobs.lock().get(&run_id) {
            job.cancel.cancel();
        }
        if run.status.is_terminal() {
            return Ok(());
        }
        let epoch_ms = self.clock.epoch_ms();
        self.store.update_run_status(run_id, RunStatus::Cancelled, epoch_ms, Some("stopped by operator"))?;
        Ok(())
    }

    /// Cancel every currently live job -- the first step of the daemon's
    /// shutdown sequence (spec.md §4.5).
    pub fn stop_all(&self) {
        for job in self.jobs.lock().values() {
            job.cancel.cancel();
        }
    }

    pub fn get(&self, run_id: RunId) -> EngineResult<JobDetailPayload> {
        let run = self.store.get_run(run_id)?.ok_or(EngineError::JobNotFound(run_id))?;
        let units = self.store.get_units_for_run(run_id)?;
        Ok(JobDetailPayload {
            run_id: run.id,
            status: run.status,
            workspace_root: run.config.workspace_root.display().to_string(),
            target_branch: run.config.target_branch,
            units: units
                .into_iter()
                .map(|u| UnitSummaryPayload { unit_id: u.id().clone(), status: u.status, branch: u.branch, error: u.error })
                .collect(),
            error: run.error,
        })
    }

    pub fn list(&self, status: Option<RunStatus>) -> EngineResult<Vec<JobSummaryPayload>> {
        let runs = match status {
            Some(status) => self.store.list_runs_by_status(status)?,
            None => {
                let mut all = Vec::new();
                for status in [RunStatus::Pending, RunStatus::Running, RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
                    all.extend(self.store.list_runs_by_status(status)?);
                }
                all
            }
        };
        runs.into_iter()
            .map(|run| {
                let units = self.store.get_units_for_run(run.id)?;
                let units_complete = units.iter().filter(|u| u.status == UnitStatus::Complete).count() as u32;
                Ok(JobSummaryPayload {
                    run_id: run.id,
                    status: run.status,
                    workspace_root: run.config.workspace_root.display().to_string(),
                    target_branch: run.config.target_branch,
                    units_total: units.len() as u32,
                    units_complete,
                })
            })
            .collect()
    }

    /// Subscribe to a still-live run's event stream. Returns
    /// [`EngineError::JobNotFound`] once the run has gone terminal and its
    /// orchestrator task has exited -- the daemon's `WatchJob` handler
    /// falls back to [`JobManager::events_since`] plus an immediate
    /// `JobTerminal` in that case, rather than this call synthesizing one.
    pub fn subscribe(&self, run_id: RunId, from_seq: Option<u64>) -> EngineResult<Subscription> {
        let bus = self.jobs.lock().get(&run_id).map(|job| job.bus.clone()).ok_or(EngineError::JobNotFound(run_id))?;
        match from_seq {
            Some(seq) => bus.subscribe_from(seq, DropPolicy::OldestDrop),
            None => Ok(bus.subscribe(DropPolicy::OldestDrop)),
        }
    }

    /// Persisted events for an archived (terminal) run, replayed from the
    /// store directly since there is no live bus left to subscribe to.
    pub fn events_since(&self, run_id: RunId, from_seq: u64) -> EngineResult<Vec<Event>> {
        Ok(self.store.list_events_since(run_id, from_seq)?)
    }

    /// Relaunch every run the store still marks `running` -- called once
    /// at daemon startup (spec.md §4.5: "ResumeJobs"). A run whose
    /// workspace root no longer exists is marked `failed` rather than
    /// resumed; an in-progress unit whose workspace directory is gone is
    /// reset to `pending` so the scheduler re-drives it from scratch.
    pub async fn resume_jobs(&self) -> Vec<RunId> {
        let mut resumed = Vec::new();
        let running = match self.store.list_runs_by_status(RunStatus::Running) {
            Ok(running) => running,
            Err(err) => {
                tracing::error!(error = %err, "failed to list running jobs for resume");
                return resumed;
            }
        };
        for run in running {
            match self.resume_one(run).await {
                Ok(run_id) => resumed.push(run_id),
                Err(err) => tracing::error!(error = %err, "failed to resume run"),
            }
        }
        resumed
    }

    async fn resume_one(&self, run: Run) -> EngineResult<RunId> {
        if !run.config.workspace_root.join(".git").exists() {
            let epoch_ms = self.clock.epoch_ms();
            self.store.update_run_status(run.id, RunStatus::Failed, epoch_ms, Some("workspace root no longer exists"))?;
            return Err(EngineError::NotAGitRepo(run.config.workspace_root.clone()));
        }

        let epoch_ms = self.clock.epoch_ms();
        let mut units = self.store.get_units_for_run(run.id)?;
        for unit in units.iter_mut() {
            if unit.status == UnitStatus::InProgress {
                let workspace_still_exists = unit.workspace_path.as_ref().is_some_and(|p| p.exists());
                if !workspace_still_exists {
                    unit.transition(UnitStatus::Pending, epoch_ms, None, None).map_err(CoreError::from)?;
                    self.store.upsert_unit(run.id, unit)?;
                }
            }
        }

        let discovered = discover_for_resume(&run.config, self.spec_loader.as_ref())?;
        let scheduler = Scheduler::build_resumed(units, epoch_ms)?;

        let bus = Bus::new(run.id, Some(self.store.clone()));
        self.spawn(run.id, run.config, scheduler, discovered, bus);
        Ok(run.id)
    }

    fn spawn(&self, run_id: RunId, config: RunConfig, scheduler: Scheduler, discovered: HashMap<UnitId, DiscoveredUnit>, bus: Bus) {
        let limits = WorkerLimits::from_config(&self.config);
        let orchestrator = Orchestrator::new(
            run_id,
            config,
            self.store.clone(),
            bus.clone(),
            scheduler,
            discovered,
            self.provider.clone(),
            self.runner.clone(),
            self.escalator.clone(),
            self.spec_loader.clone(),
            self.clock.clone(),
            limits,
            self.config.baseline_check_timeout,
        );

        let cancel = CancellationToken::new();
        let jobs = self.jobs.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            orchestrator.run(task_cancel).await;
            jobs.lock().remove(&run_id);
        });
        self.jobs.lock().insert(run_id, LiveJob { bus, cancel });
    }
}

#[cfg(test)]
#[path = "job_manager_tests.rs"]
mod tests;
