// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single-method escalation abstraction (spec.md §7: "a single-method
//! abstraction with pluggable terminal/slack/webhook backends") fired when
//! retries are exhausted on a persistent agent failure.

use async_trait::async_trait;
use serde::Serialize;
use warden_core::effect::EscalationSeverity;
use warden_core::task::TaskOrdinal;
use warden_core::unit::UnitId;

/// A structured escalation notice. Every escalation records the unit,
/// phase (conveyed in `message`), last error, and branch context per
/// spec.md §7: "every escalation records unit id, phase, last error, and
/// context (branch, target, task title as relevant)".
#[derive(Debug, Clone, Serialize)]
pub struct EscalationNotice {
    pub unit: UnitId,
    pub task: Option<TaskOrdinal>,
    pub severity: EscalationSeverity,
    pub message: String,
    pub branch: Option<String>,
    pub target_branch: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EscalatorError {
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),
}

/// A single-method abstraction over where escalations are routed.
#[async_trait]
pub trait Escalator: Send + Sync + 'static {
    async fn escalate(&self, notice: EscalationNotice) -> Result<(), EscalatorError>;
}

/// Writes to the daemon log at `error` level plus stderr. The default
/// backend; always available, never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalEscalator;

#[async_trait]
impl Escalator for TerminalEscalator {
    async fn escalate(&self, notice: EscalationNotice) -> Result<(), EscalatorError> {
        tracing::error!(
            unit = %notice.unit,
            task = ?notice.task,
            severity = %notice.severity,
            branch = ?notice.branch,
            target_branch = ?notice.target_branch,
            "{}",
            notice.message,
        );
        eprintln!("[escalation:{}] unit {} -- {}", notice.severity, notice.unit, notice.message);
        Ok(())
    }
}

/// POSTs the notice as JSON to a configured URL.
#[derive(Debug, Clone)]
pub struct WebhookEscalator {
    pub url: String,
    pub client: reqwest::Client,
}

impl WebhookEscalator {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Escalator for WebhookEscalator {
    async fn escalate(&self, notice: EscalationNotice) -> Result<(), EscalatorError> {
        self.client.post(&self.url).json(&notice).send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "escalator_tests.rs"]
mod tests;
