// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The external coding-agent capability, invoked as a subprocess rather
//! than an in-process library (Design Note).
//!
//! `Provider::invoke` never returns a parsed judgment of task completion --
//! only whether the process exited and with what code. Completion is
//! always re-derived from disk afterward by the worker's
//! `TaskCompletionProbe`, per the invariant that the agent may hit its own
//! turn limit after having already succeeded on disk.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// One invocation request: the prompt presenting the unit's ready tasks,
/// the unit's workspace as working directory, and the per-invocation
/// timeout (`WardenConfig::agent_invoke_timeout`).
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub prompt: String,
    pub workdir: PathBuf,
    pub timeout: Duration,
}

/// One line of subprocess output, tagged by stream, handed to the caller's
/// sink so it can be tee'd to a per-invocation log file and the daemon's
/// own logs simultaneously.
#[derive(Debug, Clone)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Outcome of a completed invocation. Never a judgment of task success --
/// see module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOutcome {
    Completed { exit_code: i32 },
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("io error while streaming agent output: {0}")]
    Io(#[source] std::io::Error),

    #[error("agent invocation exceeded its {0:?} timeout and was killed")]
    Timeout(Duration),

    #[error("agent invocation was cancelled")]
    Cancelled,
}

/// The external coding-agent capability. Multiple providers are
/// plug-compatible; the orchestrator does not care which is in use.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn invoke(
        &self,
        request: ProviderRequest,
        sink: &(dyn Fn(OutputLine) + Send + Sync),
        cancel: CancellationToken,
    ) -> Result<ProviderOutcome, ProviderError>;
}

/// Invokes a configurable CLI coding-agent binary (e.g. `claude`) as a
/// subprocess, given unbounded internal turns (spec.md §4.4: "the agent is
/// given UNBOUNDED internal turns per invocation; it is the orchestrator's
/// *outer* retry ... that bounds total attempts") and the blanket
/// "skip permission prompts" switch.
#[derive(Debug, Clone)]
pub struct ClaudeCliProvider {
    pub binary: PathBuf,
    pub extra_args: Vec<String>,
    /// CLI flag that skips interactive permission prompts, e.g.
    /// `--dangerously-skip-permissions`.
    pub skip_permissions_flag: String,
}

impl Default for ClaudeCliProvider {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("claude"),
            extra_args: Vec::new(),
            skip_permissions_flag: "--dangerously-skip-permissions".to_string(),
        }
    }
}

#[async_trait]
impl Provider for ClaudeCliProvider {
    async fn invoke(
        &self,
        request: ProviderRequest,
        sink: &(dyn Fn(OutputLine) + Send + Sync),
        cancel: CancellationToken,
    ) -> Result<ProviderOutcome, ProviderError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg(&request.prompt)
            .arg(&self.skip_permissions_flag)
            .args(&self.extra_args)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(ProviderError::Spawn)?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => unreachable!("stdout requested as Stdio::piped() above"),
        };
        let stderr = match child.stderr.take() {
            Some(stderr) => stderr,
            None => unreachable!("stderr requested as Stdio::piped() above"),
        };
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let pump = async {
            loop {
                tokio::select! {
                    line = stdout_lines.next_line() => match line {
                        Ok(Some(l)) => sink(OutputLine::Stdout(l)),
                        Ok(None) => break,
                        Err(e) => return Err(ProviderError::Io(e)),
                    },
                    line = stderr_lines.next_line() => match line {
                        Ok(Some(l)) => sink(OutputLine::Stderr(l)),
                        Ok(None) => {}
                        Err(e) => return Err(ProviderError::Io(e)),
                    },
                }
            }
            Ok(())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Err(ProviderError::Cancelled)
            }
            result = tokio::time::timeout(request.timeout, async {
                pump.await?;
                child.wait().await.map_err(ProviderError::Io)
            }) => {
                match result {
                    Ok(Ok(status)) => Ok(ProviderOutcome::Completed { exit_code: status.code().unwrap_or(-1) }),
                    Ok(Err(e)) => Err(e),
                    Err(_elapsed) => {
                        let _ = child.kill().await;
                        Err(ProviderError::Timeout(request.timeout))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
