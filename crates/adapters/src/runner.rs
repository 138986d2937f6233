// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git worktree/branch operations and generic shell command execution
//! (backpressure checks, baseline checks), kept as a separate capability
//! from [`crate::Provider`] (Design Note) so a worker can be tested with a
//! real `Runner` against a scratch repo and a fake `Provider`, or vice
//! versa.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {command}: {source}")]
    Spawn { command: String, #[source] source: std::io::Error },

    #[error("{command} exited {code}: {stderr}")]
    CommandFailed { command: String, code: i32, stderr: String },

    #[error("command exceeded its {0:?} timeout and was killed")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("forge-routed merge is not implemented (out of core scope; see merge_via_forge)")]
    ForgeNotImplemented,
}

/// Outcome of a general-purpose command run (backpressure, baseline
/// checks): never an error on non-zero exit -- the caller decides what a
/// non-zero exit means.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of rebasing a unit's branch onto the current target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    Clean,
    Conflict { files: Vec<String> },
}

/// Git worktree/branch operations, plus generic command execution for
/// backpressure and baseline checks.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// Create a worktree at `workspace_path`, checked out onto `branch`
    /// from `start_point` (creating the branch if absent).
    async fn create_workspace(
        &self,
        repo_root: &Path,
        workspace_path: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<(), RunnerError>;

    /// Remove a unit's isolated workspace on success.
    async fn remove_workspace(&self, repo_root: &Path, workspace_path: &Path) -> Result<(), RunnerError>;

    /// Look up whether a branch matching `branch_prefix` already exists in
    /// `repo_root` -- used on resume to decide whether to reuse a prior
    /// worker's progress.
    async fn find_existing_branch(&self, repo_root: &Path, branch_prefix: &str) -> Result<Option<String>, RunnerError>;

    async fn stage_and_commit(&self, workdir: &Path, message: &str) -> Result<(), RunnerError>;

    async fn push(&self, workdir: &Path, branch: &str) -> Result<(), RunnerError>;

    async fn rebase_onto(&self, workdir: &Path, target_branch: &str) -> Result<RebaseOutcome, RunnerError>;

    async fn abort_rebase(&self, workdir: &Path) -> Result<(), RunnerError>;

    /// Whether a rebase is currently in progress in `workdir` -- checked
    /// after a conflict-resolution attempt per spec.md §4.4: "verifying
    /// afterward that the rebase is no longer in progress".
    async fn rebase_in_progress(&self, workdir: &Path) -> Result<bool, RunnerError>;

    /// Merge a unit's branch onto the run's target branch. Open Question 3
    /// resolves this local by default; a forge-routed implementation is
    /// the out-of-scope PR/GitHub integration's job.
    async fn merge_local(&self, workdir: &Path, unit_branch: &str, target_branch: &str) -> Result<(), RunnerError>;

    /// Merge a unit's branch through the forge's own merge API instead of a
    /// local `git merge`. The out-of-scope PR/GitHub integration's job
    /// (spec.md §1); the core ships only this stub so `MergePolicy::Forge`
    /// fails loudly (escalated, not silently downgraded to local) rather
    /// than compiling away.
    async fn merge_via_forge(&self, _workdir: &Path, _unit_branch: &str, _target_branch: &str) -> Result<(), RunnerError> {
        Err(RunnerError::ForgeNotImplemented)
    }

    /// Run an arbitrary shell command (backpressure check, baseline check)
    /// in `workdir`, bounded by `timeout`. Never errors on non-zero exit.
    async fn run_command(&self, workdir: &Path, command: &str, timeout: Duration) -> Result<CommandOutcome, RunnerError>;
}

/// Real `git`-backed implementation, shelling out via `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct GitRunner;

impl GitRunner {
    async fn git(&self, workdir: &Path, args: &[&str]) -> Result<CommandOutcome, RunnerError> {
        let command_str = format!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(workdir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RunnerError::Spawn { command: command_str.clone(), source })?;
        Ok(CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn git_ok(&self, workdir: &Path, args: &[&str]) -> Result<CommandOutcome, RunnerError> {
        let command_str = format!("git {}", args.join(" "));
        let outcome = self.git(workdir, args).await?;
        if !outcome.success() {
            return Err(RunnerError::CommandFailed {
                command: command_str,
                code: outcome.exit_code,
                stderr: outcome.stderr,
            });
        }
        Ok(outcome)
    }
}

#[async_trait]
impl Runner for GitRunner {
    async fn create_workspace(
        &self,
        repo_root: &Path,
        workspace_path: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<(), RunnerError> {
        if let Some(parent) = workspace_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let existing = self.find_existing_branch(repo_root, branch).await?;
        let path_str = workspace_path.to_string_lossy().into_owned();
        if existing.is_some() {
            self.git_ok(repo_root, &["worktree", "add", &path_str, branch]).await?;
        } else {
            self.git_ok(repo_root, &["worktree", "add", "-b", branch, &path_str, start_point]).await?;
        }
        Ok(())
    }

    async fn remove_workspace(&self, repo_root: &Path, workspace_path: &Path) -> Result<(), RunnerError> {
        let path_str = workspace_path.to_string_lossy().into_owned();
        self.git(repo_root, &["worktree", "remove", "--force", &path_str]).await?;
        if workspace_path.exists() {
            tokio::fs::remove_dir_all(workspace_path).await?;
        }
        Ok(())
    }

    async fn find_existing_branch(&self, repo_root: &Path, branch_prefix: &str) -> Result<Option<String>, RunnerError> {
        let outcome = self.git(repo_root, &["branch", "--list", branch_prefix]).await?;
        let name = outcome.stdout.lines().next().map(|l| l.trim_start_matches('*').trim().to_string());
        Ok(name.filter(|n| !n.is_empty()))
    }

    async fn stage_and_commit(&self, workdir: &Path, message: &str) -> Result<(), RunnerError> {
        self.git_ok(workdir, &["add", "-A"]).await?;
        let status = self.git(workdir, &["diff", "--cached", "--quiet"]).await?;
        if status.exit_code == 0 {
            // nothing staged -- an empty commit would break the one-commit-per-task contract
            return Ok(());
        }
        self.git_ok(workdir, &["commit", "--no-verify", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, workdir: &Path, branch: &str) -> Result<(), RunnerError> {
        self.git_ok(workdir, &["push", "--force-with-lease", "origin", branch]).await?;
        Ok(())
    }

    async fn rebase_onto(&self, workdir: &Path, target_branch: &str) -> Result<RebaseOutcome, RunnerError> {
        let outcome = self.git(workdir, &["rebase", target_branch]).await?;
        if outcome.success() {
            return Ok(RebaseOutcome::Clean);
        }
        let status = self.git(workdir, &["diff", "--name-only", "--diff-filter=U"]).await?;
        let files = status.stdout.lines().map(|l| l.to_string()).collect();
        Ok(RebaseOutcome::Conflict { files })
    }

    async fn abort_rebase(&self, workdir: &Path) -> Result<(), RunnerError> {
        self.git(workdir, &["rebase", "--abort"]).await?;
        Ok(())
    }

    async fn rebase_in_progress(&self, workdir: &Path) -> Result<bool, RunnerError> {
        let outcome = self.git(workdir, &["status"]).await?;
        Ok(outcome.stdout.contains("rebase in progress") || workdir.join(".git/rebase-merge").exists() || workdir.join(".git/rebase-apply").exists())
    }

    async fn merge_local(&self, workdir: &Path, unit_branch: &str, target_branch: &str) -> Result<(), RunnerError> {
        self.git_ok(workdir, &["checkout", target_branch]).await?;
        self.git_ok(workdir, &["merge", "--no-ff", unit_branch]).await?;
        Ok(())
    }

    async fn run_command(&self, workdir: &Path, command: &str, timeout: Duration) -> Result<CommandOutcome, RunnerError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn { command: command.to_string(), source })?;

        let wait = async {
            let output = child.wait_with_output().await?;
            Ok::<_, std::io::Error>(CommandOutcome {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(RunnerError::Io(e)),
            Err(_elapsed) => Err(RunnerError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
