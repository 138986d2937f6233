// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interprets [`Effect`] values against the real `Provider`/`Runner`/
//! `Escalator`/`SpecLoader` capabilities (effect.rs module docs), turning
//! each one into a structured log span and, where relevant, an event on
//! the run's bus.
//!
//! Keeping this separate from [`crate::worker::Worker`] is what keeps the
//! worker's own decision logic a pure function of state: the worker
//! decides *what* to do next and builds an `Effect` describing it; this
//! module is the only thing that actually touches a subprocess, the
//! filesystem, or the network.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use warden_adapters::escalator::{EscalationNotice, Escalator};
use warden_adapters::provider::{OutputLine, Provider, ProviderOutcome, ProviderRequest};
use warden_adapters::runner::{CommandOutcome, RebaseOutcome, Runner};
use warden_core::effect::Effect;
use warden_core::event::Event;
use warden_core::task::TaskStatus;

use crate::bus::Bus;
use crate::error::EngineResult;
use crate::spec_loader::SpecLoader;

/// Result of executing one [`Effect`]. Most variants carry no payload;
/// the ones a caller needs to branch on (provider exit code, task status,
/// command result, rebase outcome) carry their outcome back.
#[derive(Debug, Clone)]
pub enum EffectOutcome {
    None,
    Event(Event),
    Provider(ProviderOutcome),
    TaskStatus(TaskStatus),
    Command(CommandOutcome),
    Rebase(RebaseOutcome),
    Bool(bool),
}

pub struct Executor<P, R, Esc, L> {
    provider: Arc<P>,
    runner: Arc<R>,
    escalator: Arc<Esc>,
    spec_loader: Arc<L>,
    bus: Bus,
    baseline_timeout: Duration,
    /// The run's repo root, needed by `RemoveWorkspace` (which, unlike
    /// `CreateWorkspace`, carries no `repo_root` of its own -- removal only
    /// ever targets a worktree of the one repo this run is scoped to).
    repo_root: std::path::PathBuf,
}

impl<P, R, Esc, L> Executor<P, R, Esc, L>
where
    P: Provider,
    R: Runner,
    Esc: Escalator,
    L: SpecLoader,
{
    pub fn new(
        provider: Arc<P>,
        runner: Arc<R>,
        escalator: Arc<Esc>,
        spec_loader: Arc<L>,
        bus: Bus,
        baseline_timeout: Duration,
        repo_root: std::path::PathBuf,
    ) -> Self {
        Self { provider, runner, escalator, spec_loader, bus, baseline_timeout, repo_root }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    #[tracing::instrument(skip(self, effect, cancel), fields(effect = effect.name()))]
    pub async fn execute(&self, effect: Effect, cancel: &CancellationToken) -> EngineResult<EffectOutcome> {
        for (key, value) in effect.fields() {
            tracing::debug!(effect = effect.name(), %key, %value, "executing effect");
        }

        match effect {
            Effect::Emit { event } => Ok(EffectOutcome::Event(self.bus.emit(event).await)),

            Effect::CreateWorkspace { workspace_path, repo_root, branch, start_point, .. } => {
                self.runner.create_workspace(&repo_root, &workspace_path, &branch, &start_point).await?;
                Ok(EffectOutcome::None)
            }

            Effect::RemoveWorkspace { workspace_path, .. } => {
                // best-effort: a workspace that's already gone is not an error
                if let Err(err) = self.runner.remove_workspace(&self.repo_root, &workspace_path).await {
                    tracing::warn!(error = %err, path = %workspace_path.display(), "failed to remove workspace");
                }
                Ok(EffectOutcome::None)
            }

            Effect::InvokeProvider { prompt, workdir, timeout, .. } => {
                let sink = |line: OutputLine| match line {
                    OutputLine::Stdout(l) => tracing::debug!(stream = "stdout", "{l}"),
                    OutputLine::Stderr(l) => tracing::debug!(stream = "stderr", "{l}"),
                };
                let outcome = self.provider.invoke(ProviderRequest { prompt, workdir, timeout }, &sink, cancel.clone()).await?;
                Ok(EffectOutcome::Provider(outcome))
            }

            Effect::CheckTaskSpecMarker { spec_file, .. } => {
                let status = self.spec_loader.task_status(&spec_file)?;
                Ok(EffectOutcome::TaskStatus(status))
            }

            Effect::RunBackpressure { command, workdir, timeout, .. } => {
                let outcome = self.runner.run_command(&workdir, &command, timeout).await?;
                Ok(EffectOutcome::Command(outcome))
            }

            Effect::Commit { workdir, message, .. } => {
                self.runner.stage_and_commit(&workdir, &message).await?;
                Ok(EffectOutcome::None)
            }

            Effect::RunBaselineChecks { workdir, commands, .. } => {
                let mut failures = Vec::new();
                for command in &commands {
                    let outcome = self.runner.run_command(&workdir, command, self.baseline_timeout).await?;
                    if !outcome.success() {
                        failures.push(outcome);
                    }
                }
                match failures.into_iter().next() {
                    Some(first_failure) => Ok(EffectOutcome::Command(first_failure)),
                    None => Ok(EffectOutcome::Command(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() })),
                }
            }

            Effect::Push { workdir, branch, .. } => {
                self.runner.push(&workdir, &branch).await?;
                Ok(EffectOutcome::None)
            }

            Effect::OpenPullRequest { unit, .. } => {
                tracing::info!(%unit, "open_pull_request is a synthetic no-op: forge/PR integration is out of core scope");
                Ok(EffectOutcome::None)
            }

            Effect::RebaseOntoTarget { workdir, target_branch, .. } => {
                let outcome = self.runner.rebase_onto(&workdir, &target_branch).await?;
                Ok(EffectOutcome::Rebase(outcome))
            }

            Effect::MergePullRequest { unit, .. } => {
                tracing::info!(%unit, "merge_pull_request is a synthetic no-op: use merge_local/merge_via_forge via Runner directly");
                Ok(EffectOutcome::None)
            }

            Effect::MergeLocal { workdir, unit_branch, target_branch, .. } => {
                self.runner.merge_local(&workdir, &unit_branch, &target_branch).await?;
                Ok(EffectOutcome::None)
            }

            Effect::RebaseInProgress { workdir, .. } => {
                let in_progress = self.runner.rebase_in_progress(&workdir).await?;
                Ok(EffectOutcome::Bool(in_progress))
            }

            Effect::AbortRebase { workdir, .. } => {
                self.runner.abort_rebase(&workdir).await?;
                Ok(EffectOutcome::None)
            }

            Effect::Escalate { unit, task, severity, message } => {
                let notice = EscalationNotice { unit, task, severity, message, branch: None, target_branch: None };
                self.escalator.escalate(notice).await?;
                Ok(EffectOutcome::None)
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
