// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema DDL and the ordered migration list.
//!
//! Every statement here is applied exactly once, in order, tracked by the
//! `schema_version` table. New migrations are appended, never edited.

pub const MIGRATIONS: &[&str] = &[MIGRATION_0001];

const MIGRATION_0001: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id               TEXT PRIMARY KEY,
    workspace_root   TEXT NOT NULL,
    target_branch    TEXT NOT NULL,
    unit_spec_dir    TEXT NOT NULL,
    parallelism      INTEGER NOT NULL,
    status           TEXT NOT NULL,
    started_at_ms    INTEGER NOT NULL,
    completed_at_ms  INTEGER,
    error            TEXT,
    config_json      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_runs_active_branch
    ON runs(workspace_root, target_branch)
    WHERE status = 'running';

CREATE TABLE IF NOT EXISTS units (
    run_id           TEXT NOT NULL REFERENCES runs(id),
    unit_id          TEXT NOT NULL,
    status           TEXT NOT NULL,
    depends_on_json  TEXT NOT NULL,
    branch           TEXT,
    workspace_path   TEXT,
    started_at_ms    INTEGER,
    completed_at_ms  INTEGER,
    error            TEXT,
    PRIMARY KEY (run_id, unit_id)
);

CREATE INDEX IF NOT EXISTS idx_units_run_id ON units(run_id);
CREATE INDEX IF NOT EXISTS idx_units_status ON units(status);

CREATE TABLE IF NOT EXISTS events (
    rowid_pk         INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id           TEXT NOT NULL REFERENCES runs(id),
    sequence         INTEGER NOT NULL,
    event_type       TEXT NOT NULL,
    timestamp        TEXT NOT NULL,
    unit_id          TEXT,
    task_ordinal     INTEGER,
    pr               INTEGER,
    payload_json     TEXT,
    error            TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_events_run_sequence ON events(run_id, sequence);
"#;

/// Apply every migration not yet recorded in `schema_version`.
pub fn run_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;
    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
        .unwrap_or(0);

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }
        conn.execute_batch(migration)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
