// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic fakes for `warden-engine`'s worker tests, gated behind
//! `#[cfg(any(test, feature = "test-support"))]` (the same pattern as the
//! teacher's `NotifyAdapter` fakes).

use crate::escalator::{EscalationNotice, Escalator, EscalatorError};
use crate::provider::{OutputLine, Provider, ProviderError, ProviderOutcome, ProviderRequest};
use crate::runner::{CommandOutcome, RebaseOutcome, Runner, RunnerError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A scripted [`Provider`] that returns a queued outcome per call, falling
/// back to a default once the queue is drained.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeProviderState>>,
}

#[derive(Default)]
struct FakeProviderState {
    outcomes: VecDeque<Result<ProviderOutcome, String>>,
    invocations: Vec<ProviderRequest>,
    /// Runs once per invocation before the outcome is returned -- lets
    /// tests simulate the agent writing files to the workspace.
    on_invoke: Option<Arc<dyn Fn(&ProviderRequest) + Send + Sync>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&self, exit_code: i32) {
        self.state.lock().outcomes.push_back(Ok(ProviderOutcome::Completed { exit_code }));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.state.lock().outcomes.push_back(Err(message.into()));
    }

    pub fn on_invoke(&self, f: impl Fn(&ProviderRequest) + Send + Sync + 'static) {
        self.state.lock().on_invoke = Some(Arc::new(f));
    }

    pub fn invocation_count(&self) -> usize {
        self.state.lock().invocations.len()
    }

    pub fn invocations(&self) -> Vec<ProviderRequest> {
        self.state.lock().invocations.clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn invoke(
        &self,
        request: ProviderRequest,
        sink: &(dyn Fn(OutputLine) + Send + Sync),
        _cancel: CancellationToken,
    ) -> Result<ProviderOutcome, ProviderError> {
        let (hook, outcome) = {
            let mut state = self.state.lock();
            state.invocations.push(request.clone());
            (state.on_invoke.clone(), state.outcomes.pop_front())
        };
        if let Some(hook) = hook {
            hook(&request);
        }
        sink(OutputLine::Stdout("fake provider invoked".to_string()));
        match outcome.unwrap_or(Ok(ProviderOutcome::Completed { exit_code: 0 })) {
            Ok(outcome) => Ok(outcome),
            Err(message) => Err(ProviderError::Io(std::io::Error::other(message))),
        }
    }
}

/// An in-memory [`Runner`] that performs real filesystem bookkeeping (so
/// commit/backpressure call sites see consistent state) without shelling
/// out to `git`.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<FakeRunnerState>>,
}

#[derive(Default)]
struct FakeRunnerState {
    commits: Vec<(String, String)>,
    pushed_branches: Vec<String>,
    rebase_outcomes: VecDeque<RebaseOutcome>,
    command_outcomes: VecDeque<CommandOutcome>,
    existing_branches: std::collections::HashSet<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rebase_outcome(&self, outcome: RebaseOutcome) {
        self.state.lock().rebase_outcomes.push_back(outcome);
    }

    pub fn push_command_outcome(&self, outcome: CommandOutcome) {
        self.state.lock().command_outcomes.push_back(outcome);
    }

    pub fn register_existing_branch(&self, branch: impl Into<String>) {
        self.state.lock().existing_branches.insert(branch.into());
    }

    pub fn commits(&self) -> Vec<(String, String)> {
        self.state.lock().commits.clone()
    }

    pub fn pushed_branches(&self) -> Vec<String> {
        self.state.lock().pushed_branches.clone()
    }
}

#[async_trait]
impl Runner for FakeRunner {
    async fn create_workspace(
        &self,
        _repo_root: &Path,
        workspace_path: &Path,
        _branch: &str,
        _start_point: &str,
    ) -> Result<(), RunnerError> {
        tokio::fs::create_dir_all(workspace_path).await?;
        Ok(())
    }

    async fn remove_workspace(&self, _repo_root: &Path, workspace_path: &Path) -> Result<(), RunnerError> {
        if workspace_path.exists() {
            tokio::fs::remove_dir_all(workspace_path).await?;
        }
        Ok(())
    }

    async fn find_existing_branch(&self, _repo_root: &Path, branch_prefix: &str) -> Result<Option<String>, RunnerError> {
        Ok(self.state.lock().existing_branches.iter().find(|b| b.starts_with(branch_prefix)).cloned())
    }

    async fn stage_and_commit(&self, workdir: &Path, message: &str) -> Result<(), RunnerError> {
        self.state.lock().commits.push((workdir.display().to_string(), message.to_string()));
        Ok(())
    }

    async fn push(&self, _workdir: &Path, branch: &str) -> Result<(), RunnerError> {
        self.state.lock().pushed_branches.push(branch.to_string());
        Ok(())
    }

    async fn rebase_onto(&self, _workdir: &Path, _target_branch: &str) -> Result<RebaseOutcome, RunnerError> {
        Ok(self.state.lock().rebase_outcomes.pop_front().unwrap_or(RebaseOutcome::Clean))
    }

    async fn abort_rebase(&self, _workdir: &Path) -> Result<(), RunnerError> {
        Ok(())
    }

    async fn rebase_in_progress(&self, _workdir: &Path) -> Result<bool, RunnerError> {
        Ok(false)
    }

    async fn merge_local(&self, _workdir: &Path, _unit_branch: &str, _target_branch: &str) -> Result<(), RunnerError> {
        Ok(())
    }

    async fn run_command(&self, _workdir: &Path, _command: &str, _timeout: Duration) -> Result<CommandOutcome, RunnerError> {
        Ok(self
            .state
            .lock()
            .command_outcomes
            .pop_front()
            .unwrap_or(CommandOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() }))
    }
}

/// Records every escalation for test assertions; never fails.
#[derive(Clone, Default)]
pub struct FakeEscalator {
    notices: Arc<Mutex<Vec<EscalationNotice>>>,
}

impl FakeEscalator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<EscalationNotice> {
        self.notices.lock().clone()
    }
}

#[async_trait]
impl Escalator for FakeEscalator {
    async fn escalate(&self, notice: EscalationNotice) -> Result<(), EscalatorError> {
        self.notices.lock().push(notice);
        Ok(())
    }
}
