// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rusqlite::Connection;

#[test]
fn migrations_are_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0)).unwrap();
    assert_eq!(version, MIGRATIONS.len() as i64);
}

#[test]
fn migrations_create_all_three_tables() {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();

    for table in ["runs", "units", "events"] {
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1, "missing table {table}");
    }
}

#[test]
fn duplicate_active_run_is_rejected_by_the_unique_index() {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();

    let insert = "INSERT INTO runs (id, workspace_root, target_branch, unit_spec_dir, parallelism, status, started_at_ms, completed_at_ms, error, config_json) VALUES (?1, 'root', 'main', 'tasks', 1, 'running', 0, NULL, NULL, '{}')";
    conn.execute(insert, ["run-a"]).unwrap();
    let err = conn.execute(insert, ["run-b"]).unwrap_err();
    assert!(matches!(err, rusqlite::Error::SqliteFailure(..)));
}
