// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-scoped DAG scheduler (spec.md §4.3).
//!
//! Tracks one run's units as a dependency graph, maintaining a ready set
//! as an incoming-non-complete-edge-count drain -- the same pass also
//! serves as Kahn's algorithm's cycle check at `build()` time, so no
//! separate cycle-detection traversal is needed later.

use std::collections::{BTreeSet, HashMap, VecDeque};

use warden_core::error::{CoreError, CoreResult};
use warden_core::unit::{Unit, UnitId, UnitStatus};

/// One run's unit DAG plus the scheduling state derived from it.
pub struct Scheduler {
    units: HashMap<UnitId, Unit>,
    /// Successor edges: unit -> units that depend on it.
    dependents: HashMap<UnitId, Vec<UnitId>>,
    /// Remaining non-complete dependency count per unit.
    incoming: HashMap<UnitId, usize>,
    ready: BTreeSet<UnitId>,
}

impl Scheduler {
    /// Validate and build a scheduler over `units`: every `depends_on`
    /// entry must name a unit present in the set, and the dependency graph
    /// must be acyclic. Units with zero dependencies are seeded into the
    /// ready set (transitioned `pending -> ready`).
    pub fn build(mut units: Vec<Unit>, epoch_ms: u64) -> CoreResult<Self> {
        let ids: std::collections::HashSet<&UnitId> = units.iter().map(|u| u.id()).collect();
        for unit in &units {
            for dep in &unit.depends_on {
                if !ids.contains(dep) {
                    return Err(CoreError::MissingDependency {
                        unit: unit.id().to_string(),
                        missing: dep.to_string(),
                    });
                }
            }
        }

        let mut dependents: HashMap<UnitId, Vec<UnitId>> = HashMap::new();
        let mut incoming: HashMap<UnitId, usize> = HashMap::new();
        for unit in &units {
            incoming.insert(unit.id().clone(), unit.depends_on.len());
            for dep in &unit.depends_on {
                dependents.entry(dep.clone()).or_default().push(unit.id().clone());
            }
        }

        Self::check_acyclic(&incoming, &dependents)?;

        let mut ready = BTreeSet::new();
        for unit in units.iter_mut() {
            if incoming[unit.id()] == 0 {
                unit.transition(UnitStatus::Ready, epoch_ms, None, None)?;
                ready.insert(unit.id().clone());
            }
        }

        let units = units.into_iter().map(|u| (u.id().clone(), u)).collect();
        Ok(Self { units, dependents, incoming, ready })
    }

    /// Kahn's algorithm: drain nodes with zero incoming edges, decrementing
    /// their successors'. Any node left undrained when the queue empties is
    /// part of a cycle.
    fn check_acyclic(incoming: &HashMap<UnitId, usize>, dependents: &HashMap<UnitId, Vec<UnitId>>) -> CoreResult<()> {
        let mut remaining = incoming.clone();
        let mut queue: VecDeque<UnitId> = remaining.iter().filter(|(_, c)| **c == 0).map(|(id, _)| id.clone()).collect();
        let mut drained: std::collections::HashSet<UnitId> = std::collections::HashSet::new();

        while let Some(id) = queue.pop_front() {
            drained.insert(id.clone());
            if let Some(succs) = dependents.get(&id) {
                for succ in succs {
                    if let Some(count) = remaining.get_mut(succ) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(succ.clone());
                        }
                    }
                }
            }
        }

        if drained.len() != remaining.len() {
            let mut cyclic: Vec<String> = remaining.keys().filter(|id| !drained.contains(*id)).map(|id| id.to_string()).collect();
            cyclic.sort();
            return Err(CoreError::CyclicDag(cyclic));
        }
        Ok(())
    }

    /// Build a scheduler over units already carrying persisted state
    /// (`ResumeJobs`, spec.md §4.5) rather than fresh `pending` units.
    /// Incoming-edge counts only count *non-complete* dependencies (§4.3),
    /// since a resumed unit's dependencies may already be complete; a
    /// `Pending` unit whose count has already reached zero is promoted to
    /// `Ready` the same as a fresh build, while units already `Ready` are
    /// folded straight into the ready set without re-running the
    /// transition (which would reject `Ready -> Ready` as a no-op, not an
    /// error, but skips the redundant call regardless).
    pub fn build_resumed(units: Vec<Unit>, epoch_ms: u64) -> CoreResult<Self> {
        let ids: std::collections::HashSet<&UnitId> = units.iter().map(|u| u.id()).collect();
        for unit in &units {
            for dep in &unit.depends_on {
                if !ids.contains(dep) {
                    return Err(CoreError::MissingDependency {
                        unit: unit.id().to_string(),
                        missing: dep.to_string(),
                    });
                }
            }
        }

        let by_id: HashMap<UnitId, UnitStatus> = units.iter().map(|u| (u.id().clone(), u.status)).collect();
        let mut dependents: HashMap<UnitId, Vec<UnitId>> = HashMap::new();
        let mut incoming: HashMap<UnitId, usize> = HashMap::new();
        for unit in &units {
            let non_complete = unit.depends_on.iter().filter(|d| by_id.get(*d) != Some(&UnitStatus::Complete)).count();
            incoming.insert(unit.id().clone(), non_complete);
            for dep in &unit.depends_on {
                dependents.entry(dep.clone()).or_default().push(unit.id().clone());
            }
        }

        Self::check_acyclic(&incoming, &dependents)?;

        let mut ready = BTreeSet::new();
        let mut units = units;
        for unit in units.iter_mut() {
            match unit.status {
                UnitStatus::Ready => {
                    ready.insert(unit.id().clone());
                }
                UnitStatus::Pending if incoming[unit.id()] == 0 => {
                    unit.transition(UnitStatus::Ready, epoch_ms, None, None)?;
                    ready.insert(unit.id().clone());
                }
                _ => {}
            }
        }

        let units = units.into_iter().map(|u| (u.id().clone(), u)).collect();
        Ok(Self { units, dependents, incoming, ready })
    }

    /// Snapshot of the currently ready unit ids.
    pub fn ready(&self) -> BTreeSet<UnitId> {
        self.ready.clone()
    }

    /// Units left `in_progress` by a prior daemon instance -- on resume
    /// these are re-driven rather than re-promoted through `ready`
    /// (spec.md §4.5: "validate in-progress units' workspaces still
    /// exist").
    pub fn in_progress(&self) -> BTreeSet<UnitId> {
        self.units.values().filter(|u| u.status == UnitStatus::InProgress).map(|u| u.id().clone()).collect()
    }

    pub fn unit(&self, id: &UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn mark_in_progress(&mut self, id: &UnitId, epoch_ms: u64, branch: String) -> CoreResult<()> {
        let unit = self.units.get_mut(id).ok_or_else(|| CoreError::MissingDependency {
            unit: id.to_string(),
            missing: id.to_string(),
        })?;
        unit.transition(UnitStatus::InProgress, epoch_ms, Some(branch), None)?;
        self.ready.remove(id);
        Ok(())
    }

    pub fn mark_complete(&mut self, id: &UnitId, epoch_ms: u64) -> CoreResult<()> {
        {
            let unit = self.require_unit_mut(id)?;
            unit.transition(UnitStatus::Complete, epoch_ms, None, None)?;
        }
        self.ready.remove(id);
        self.promote_successors(id, epoch_ms)?;
        Ok(())
    }

    pub fn mark_failed(&mut self, id: &UnitId, epoch_ms: u64, error: String) -> CoreResult<()> {
        {
            let unit = self.require_unit_mut(id)?;
            unit.transition(UnitStatus::Failed, epoch_ms, None, Some(error))?;
        }
        self.ready.remove(id);
        self.block_successors(id, epoch_ms);
        Ok(())
    }

    pub fn mark_blocked(&mut self, id: &UnitId, epoch_ms: u64, error: String) -> CoreResult<()> {
        let unit = self.require_unit_mut(id)?;
        unit.transition(UnitStatus::Blocked, epoch_ms, None, Some(error))?;
        self.ready.remove(id);
        Ok(())
    }

    fn require_unit_mut(&mut self, id: &UnitId) -> CoreResult<&mut Unit> {
        self.units.get_mut(id).ok_or_else(|| CoreError::MissingDependency {
            unit: id.to_string(),
            missing: id.to_string(),
        })
    }

    /// A completed unit may free its successors' last outstanding
    /// dependency; promote any that reach zero from `pending` to `ready`.
    fn promote_successors(&mut self, id: &UnitId, epoch_ms: u64) -> CoreResult<()> {
        let Some(succs) = self.dependents.get(id).cloned() else { return Ok(()) };
        for succ in succs {
            if let Some(count) = self.incoming.get_mut(&succ) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    if let Some(unit) = self.units.get_mut(&succ) {
                        if unit.status == UnitStatus::Pending {
                            unit.transition(UnitStatus::Ready, epoch_ms, None, None)?;
                            self.ready.insert(succ);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Propagate `blocked` transitively to every non-terminal successor of
    /// a failed unit -- spec.md §4.3: "failed/blocked propagate
    /// transitively to successors".
    fn block_successors(&mut self, id: &UnitId, epoch_ms: u64) {
        let mut stack: Vec<UnitId> = self.dependents.get(id).cloned().unwrap_or_default();
        while let Some(next_id) = stack.pop() {
            let blocked_now = match self.units.get_mut(&next_id) {
                Some(unit) if !unit.status.is_terminal() => {
                    let _ = unit.transition(
                        UnitStatus::Blocked,
                        epoch_ms,
                        None,
                        Some(format!("upstream unit {id} failed")),
                    );
                    self.ready.remove(&next_id);
                    true
                }
                _ => false,
            };
            if blocked_now {
                if let Some(more) = self.dependents.get(&next_id) {
                    stack.extend(more.iter().cloned());
                }
            }
        }
    }

    pub fn all_complete(&self) -> bool {
        self.units.values().all(|u| u.status == UnitStatus::Complete)
    }

    pub fn all_blocked_or_failed(&self) -> bool {
        self.units.values().all(|u| u.status.is_terminal())
    }

    /// True once every unit has reached a terminal status -- success
    /// (`all_complete`) or otherwise (`all_blocked_or_failed`).
    pub fn is_finished(&self) -> bool {
        self.units.values().all(|u| u.status.is_terminal())
    }

    /// No unit ready, at least one non-terminal unit remains, and none is
    /// in flight: the "no tasks ready but not all complete" contract
    /// violation spec.md §7 calls out. `build()`'s cycle check should make
    /// this unreachable in practice; it exists as a defensive backstop.
    pub fn is_deadlocked(&self) -> bool {
        if !self.ready.is_empty() || self.is_finished() {
            return false;
        }
        !self.units.values().any(|u| {
            matches!(
                u.status,
                UnitStatus::InProgress | UnitStatus::PrOpen | UnitStatus::InReview | UnitStatus::Merging
            )
        })
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
