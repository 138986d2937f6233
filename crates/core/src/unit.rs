// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit identifier and state machine.
//!
//! A unit is one node of a run's DAG: an ordered list of tasks, a set of
//! sibling dependencies, and a workspace that comes into existence only
//! once the unit starts running.

use crate::run::RunId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Local identifier for a unit within its run -- the subdirectory name
/// under the run's unit-spec directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for UnitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Composite key identifying a unit: its run plus its local id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub run_id: RunId,
    pub unit_id: UnitId,
}

impl UnitKey {
    pub fn new(run_id: RunId, unit_id: impl Into<UnitId>) -> Self {
        Self {
            run_id,
            unit_id: unit_id.into(),
        }
    }
}

/// Status of a unit. Transitions only move forward along the DAG
/// `pending -> ready -> in_progress -> {pr_open -> in_review -> merging ->}
/// complete`, with `failed` and `blocked` as terminal side exits reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Ready,
    InProgress,
    PrOpen,
    InReview,
    Merging,
    Complete,
    Failed,
    Blocked,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitStatus::Complete | UnitStatus::Failed | UnitStatus::Blocked)
    }

    /// Whether `self -> next` is legal under the unit state machine.
    ///
    /// `InProgress -> Pending` is a special case: it is the resume reset for
    /// a unit that was marked in-progress but whose workspace no longer
    /// exists (Design Note: "resets *in_progress with no valid workspace*
    /// back to pending"), not a forward step.
    pub fn can_transition_to(self, next: UnitStatus) -> bool {
        use UnitStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Pending, Ready) => true,
            (Ready, InProgress) => true,
            (InProgress, Pending) => true,
            (InProgress, PrOpen | Complete) => true,
            (PrOpen, InReview) => true,
            (InReview, Merging) => true,
            (Merging, Complete) => true,
            (from, Failed | Blocked) if !from.is_terminal() => true,
            _ => false,
        }
    }
}

crate::simple_display! {
    UnitStatus {
        Pending => "pending",
        Ready => "ready",
        InProgress => "in_progress",
        PrOpen => "pr_open",
        InReview => "in_review",
        Merging => "merging",
        Complete => "complete",
        Failed => "failed",
        Blocked => "blocked",
    }
}

/// One node of a run's DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub key: UnitKey,
    pub status: UnitStatus,
    /// Sibling unit ids this unit depends on.
    pub depends_on: BTreeSet<UnitId>,
    /// Assigned on first `in_progress` transition.
    pub branch: Option<String>,
    /// Assigned when the isolated workspace is created.
    pub workspace_path: Option<PathBuf>,
    pub started_at_epoch_ms: Option<u64>,
    pub completed_at_epoch_ms: Option<u64>,
    pub error: Option<String>,
}

impl Unit {
    pub fn new(key: UnitKey, depends_on: BTreeSet<UnitId>) -> Self {
        Self {
            key,
            status: UnitStatus::Pending,
            depends_on,
            branch: None,
            workspace_path: None,
            started_at_epoch_ms: None,
            completed_at_epoch_ms: None,
            error: None,
        }
    }

    pub fn id(&self) -> &UnitId {
        &self.key.unit_id
    }

    /// Apply a status transition, rejecting illegal moves. Assigns `branch`
    /// on the first transition into `in_progress` if not already set.
    pub fn transition(
        &mut self,
        next: UnitStatus,
        epoch_ms: u64,
        branch: Option<String>,
        error: Option<String>,
    ) -> Result<(), UnitTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(UnitTransitionError {
                unit_id: self.key.unit_id.clone(),
                from: self.status,
                to: next,
            });
        }
        if self.status == next {
            return Ok(());
        }
        self.status = next;
        match next {
            UnitStatus::InProgress => {
                self.started_at_epoch_ms.get_or_insert(epoch_ms);
                if self.branch.is_none() {
                    self.branch = branch;
                }
            }
            UnitStatus::Pending => {
                // resume reset: forget workspace and progress markers
                self.workspace_path = None;
                self.started_at_epoch_ms = None;
            }
            _ if next.is_terminal() => {
                self.completed_at_epoch_ms = Some(epoch_ms);
                self.error = error;
            }
            _ => {}
        }
        Ok(())
    }

    /// Derive the branch name for a fresh `in_progress` transition, per the
    /// worker's "unit id plus a short hash of unit id + startup timestamp"
    /// rule.
    pub fn derive_branch_name(unit_id: &UnitId, startup_epoch_ms: u64) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        unit_id.as_str().hash(&mut hasher);
        startup_epoch_ms.hash(&mut hasher);
        format!("unit/{}-{:x}", unit_id.as_str(), hasher.finish() & 0xffff)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal unit transition for {unit_id}: {from} -> {to}")]
pub struct UnitTransitionError {
    pub unit_id: UnitId,
    pub from: UnitStatus,
    pub to: UnitStatus,
}

#[cfg(test)]
#[path = "unit_tests.rs"]
mod tests;
