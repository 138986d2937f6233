// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, crash-safe storage of runs, units, and events.
//!
//! Backed by SQLite (`rusqlite`, bundled) in WAL journal mode: readers never
//! block behind a writer, and the database survives `kill -9` mid-write.
//! A single connection guarded by a mutex serializes all writers -- a
//! deliberate simplification of the "writes for the same run serialize,
//! writes for different runs may run concurrently" contract. It trades
//! cross-run write concurrency for a much simpler implementation; per-run
//! serialization (the invariant that actually matters for correctness) is
//! preserved as a strict subset.

use crate::error::{StoreError, StoreResult};
use crate::schema;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_core::event::{Event, EventType};
use warden_core::run::{Run, RunConfig, RunId, RunStatus};
use warden_core::unit::{Unit, UnitId, UnitKey, UnitStatus};

/// Embedded relational store for one daemon's state directory.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if absent) the database file at `path`, enabling WAL
    /// mode, foreign keys, and running any pending migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store for tests that don't need a real file on disk.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn configure(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    /// Create a run row as `running`, rejecting a duplicate active run for
    /// the same (workspace_root, target_branch) pair.
    pub fn create_run(&self, config: RunConfig, started_at_epoch_ms: u64) -> StoreResult<Run> {
        self.create_run_with_id(RunId::new(), config, started_at_epoch_ms)
    }

    /// Same as [`Store::create_run`], but with a caller-supplied id -- the
    /// job manager validates a candidate run's DAG (spec.md §7: a cyclic
    /// DAG must leave no row behind) before persisting anything, so the id
    /// handed to the in-memory scheduler/bus has to be the one that ends up
    /// in this row, not one generated fresh at insert time.
    ///
    /// Inserts directly as `running`, not `pending`: `idx_runs_active_branch`
    /// (schema.rs) is a partial unique index `WHERE status = 'running'`, so
    /// the duplicate-active-run constraint (spec.md §4.2) can only fire at
    /// insert time if the row is born in that state. A caller that needs the
    /// pre-dispatch `pending` status for its own bookkeeping should not rely
    /// on this row ever passing through it.
    pub fn create_run_with_id(&self, id: RunId, config: RunConfig, started_at_epoch_ms: u64) -> StoreResult<Run> {
        let run = Run { id, config, status: RunStatus::Running, started_at_epoch_ms, completed_at_epoch_ms: None, error: None };
        let conn = self.conn.lock();
        let config_json = serde_json::to_string(&run.config)?;
        let result = conn.execute(
            "INSERT INTO runs (id, workspace_root, target_branch, unit_spec_dir, parallelism, status, started_at_ms, completed_at_ms, error, config_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, ?8)",
            params![
                run.id.to_string(),
                run.config.workspace_root.display().to_string(),
                run.config.target_branch,
                run.config.unit_spec_dir.display().to_string(),
                run.config.parallelism,
                "running",
                started_at_epoch_ms as i64,
                config_json,
            ],
        );
        match result {
            Ok(_) => Ok(run),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateActiveRun {
                    workspace_root: run.config.workspace_root.display().to_string(),
                    target_branch: run.config.target_branch.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a non-active run row for the same (workspace_root,
    /// target_branch) pair, if one exists. `StartJob` calls this before
    /// `create_run_with_id` to clear a terminal run's leftover row so it
    /// never collides with the active-run uniqueness index -- that index
    /// only guards `status = 'running'`, but a stale `pending`/terminal row
    /// for the same pair would otherwise accumulate forever.
    pub fn delete_inactive_run(&self, workspace_root: &Path, target_branch: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM runs WHERE workspace_root = ?1 AND target_branch = ?2 AND status != 'running'",
            params![workspace_root.display().to_string(), target_branch],
        )?;
        Ok(())
    }

    pub fn get_run(&self, id: RunId) -> StoreResult<Option<Run>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT * FROM runs WHERE id = ?1", params![id.to_string()], row_to_run)
            .optional()
            .map_err(Into::into)
    }

    /// The sole source of truth for what to resume on daemon start.
    pub fn list_runs_by_status(&self, status: RunStatus) -> StoreResult<Vec<Run>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM runs WHERE status = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![status.to_string()], row_to_run)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Idempotent: writing the same terminal status twice is a no-op.
    pub fn update_run_status(
        &self,
        id: RunId,
        next: RunStatus,
        epoch_ms: u64,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        let Some(mut run) = conn
            .query_row("SELECT * FROM runs WHERE id = ?1", params![id.to_string()], row_to_run)
            .optional()?
        else {
            return Err(StoreError::RunNotFound(id.to_string()));
        };
        run.transition(next, epoch_ms, error.map(str::to_string))
            .map_err(|e| StoreError::UnknownStatus(e.to_string()))?;
        conn.execute(
            "UPDATE runs SET status = ?1, completed_at_ms = ?2, error = ?3 WHERE id = ?4",
            params![
                run.status.to_string(),
                run.completed_at_epoch_ms.map(|v| v as i64),
                run.error,
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_unit(&self, run_id: RunId, unit: &Unit) -> StoreResult<()> {
        let conn = self.conn.lock();
        let depends_on_json = serde_json::to_string(&unit.depends_on)?;
        conn.execute(
            "INSERT INTO units (run_id, unit_id, status, depends_on_json, branch, workspace_path, started_at_ms, completed_at_ms, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(run_id, unit_id) DO UPDATE SET
                status = excluded.status,
                branch = excluded.branch,
                workspace_path = excluded.workspace_path,
                started_at_ms = excluded.started_at_ms,
                completed_at_ms = excluded.completed_at_ms,
                error = excluded.error",
            params![
                run_id.to_string(),
                unit.id().as_str(),
                unit.status.to_string(),
                depends_on_json,
                unit.branch,
                unit.workspace_path.as_ref().map(|p| p.display().to_string()),
                unit.started_at_epoch_ms.map(|v| v as i64),
                unit.completed_at_epoch_ms.map(|v| v as i64),
                unit.error,
            ],
        )?;
        Ok(())
    }

    pub fn get_units_for_run(&self, run_id: RunId) -> StoreResult<Vec<Unit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM units WHERE run_id = ?1 ORDER BY unit_id")?;
        let rows = stmt.query_map(params![run_id.to_string()], |row| row_to_unit(row, run_id))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_unit(&self, run_id: RunId, unit_id: &UnitId) -> StoreResult<Option<Unit>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM units WHERE run_id = ?1 AND unit_id = ?2",
            params![run_id.to_string(), unit_id.as_str()],
            |row| row_to_unit(row, run_id),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Assigns the next per-run sequence inside the same write transaction
    /// that inserts the row, so a concurrent `list_events_since` reader
    /// never observes a gap.
    pub fn append_event(&self, mut event: Event) -> StoreResult<Event> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM events WHERE run_id = ?1",
            params![event.run_id.to_string()],
            |r| r.get(0),
        )?;
        event.sequence = next_seq as u64;
        let payload_json = event.payload.as_ref().map(serde_json::to_string).transpose()?;
        tx.execute(
            "INSERT INTO events (run_id, sequence, event_type, timestamp, unit_id, task_ordinal, pr, payload_json, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.run_id.to_string(),
                next_seq,
                event_type_to_column(&event.event_type)?,
                event.timestamp.to_rfc3339(),
                event.unit.as_ref().map(|u| u.as_str().to_string()),
                event.task.map(|t| t.0),
                event.pr.map(|p| p as i64),
                payload_json,
                event.error,
            ],
        )?;
        tx.commit()?;
        Ok(event)
    }

    /// All persisted events with sequence >= `from_seq`, in order.
    pub fn list_events_since(&self, run_id: RunId, from_seq: u64) -> StoreResult<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM events WHERE run_id = ?1 AND sequence >= ?2 ORDER BY sequence",
        )?;
        let rows = stmt.query_map(params![run_id.to_string(), from_seq as i64], |row| row_to_event(row, run_id))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn db_path(state_dir: &Path) -> PathBuf {
        state_dir.join("warden.sqlite3")
    }
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
    let id_str: String = row.get("id")?;
    let id = RunId::parse(&id_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text)
    })?;
    let status_str: String = row.get("status")?;
    let status = parse_run_status(&status_str)?;
    let config_json: String = row.get("config_json")?;
    let config: RunConfig = serde_json::from_str(&config_json)
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "config_json".into(), rusqlite::types::Type::Text))?;
    Ok(Run {
        id,
        config,
        status,
        started_at_epoch_ms: row.get::<_, i64>("started_at_ms")? as u64,
        completed_at_epoch_ms: row.get::<_, Option<i64>>("completed_at_ms")?.map(|v| v as u64),
        error: row.get("error")?,
    })
}

fn row_to_unit(row: &rusqlite::Row, run_id: RunId) -> rusqlite::Result<Unit> {
    let unit_id: String = row.get("unit_id")?;
    let status_str: String = row.get("status")?;
    let status = parse_unit_status(&status_str)?;
    let depends_on_json: String = row.get("depends_on_json")?;
    let depends_on: BTreeSet<UnitId> = serde_json::from_str(&depends_on_json)
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "depends_on_json".into(), rusqlite::types::Type::Text))?;
    Ok(Unit {
        key: UnitKey::new(run_id, unit_id),
        status,
        depends_on,
        branch: row.get("branch")?,
        workspace_path: row.get::<_, Option<String>>("workspace_path")?.map(PathBuf::from),
        started_at_epoch_ms: row.get::<_, Option<i64>>("started_at_ms")?.map(|v| v as u64),
        completed_at_epoch_ms: row.get::<_, Option<i64>>("completed_at_ms")?.map(|v| v as u64),
        error: row.get("error")?,
    })
}

fn row_to_event(row: &rusqlite::Row, run_id: RunId) -> rusqlite::Result<Event> {
    let event_type_str: String = row.get("event_type")?;
    let event_type = parse_event_type(&event_type_str)?;
    let timestamp_str: String = row.get("timestamp")?;
    let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "timestamp".into(), rusqlite::types::Type::Text))?
        .with_timezone(&chrono::Utc);
    let payload_json: Option<String> = row.get("payload_json")?;
    let payload = payload_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "payload_json".into(), rusqlite::types::Type::Text))?;
    Ok(Event {
        run_id,
        sequence: row.get::<_, i64>("sequence")? as u64,
        event_type,
        timestamp,
        unit: row.get::<_, Option<String>>("unit_id")?.map(UnitId::new),
        task: row.get::<_, Option<u32>>("task_ordinal")?.map(warden_core::task::TaskOrdinal),
        pr: row.get::<_, Option<i64>>("pr")?.map(|v| v as u64),
        payload,
        error: row.get("error")?,
    })
}

fn parse_run_status(s: &str) -> rusqlite::Result<RunStatus> {
    match s {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        other => Err(rusqlite::Error::InvalidColumnType(
            0,
            format!("unknown run status {other}"),
            rusqlite::types::Type::Text,
        )),
    }
}

fn parse_unit_status(s: &str) -> rusqlite::Result<UnitStatus> {
    match s {
        "pending" => Ok(UnitStatus::Pending),
        "ready" => Ok(UnitStatus::Ready),
        "in_progress" => Ok(UnitStatus::InProgress),
        "pr_open" => Ok(UnitStatus::PrOpen),
        "in_review" => Ok(UnitStatus::InReview),
        "merging" => Ok(UnitStatus::Merging),
        "complete" => Ok(UnitStatus::Complete),
        "failed" => Ok(UnitStatus::Failed),
        "blocked" => Ok(UnitStatus::Blocked),
        other => Err(rusqlite::Error::InvalidColumnType(
            0,
            format!("unknown unit status {other}"),
            rusqlite::types::Type::Text,
        )),
    }
}

fn parse_event_type(s: &str) -> rusqlite::Result<EventType> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, format!("unknown event type {s}"), rusqlite::types::Type::Text)
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
