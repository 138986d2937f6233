// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn discovers_units_and_parses_their_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(
        &root.join("alpha/plan.md"),
        "---\nid: alpha\ndepends_on: []\n---\nAlpha unit.\n",
    );
    write(
        &root.join("beta/plan.md"),
        "---\nid: beta\ndepends_on: [alpha]\nbaseline_checks: [cargo fmt --check; cargo test]\nreview: true\npublish: false\ntarget_branch: release\n---\nBeta unit.\n",
    );

    let loader = FsSpecLoader::new();
    let mut units = loader.discover_units(root).unwrap();
    units.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    assert_eq!(units.len(), 2);
    assert_eq!(units[0].id, UnitId::new("alpha"));
    assert!(units[0].depends_on.is_empty());
    assert!(units[0].publish_enabled, "publish defaults to true when the frontmatter omits it");

    assert_eq!(units[1].id, UnitId::new("beta"));
    assert_eq!(units[1].depends_on, BTreeSet::from([UnitId::new("alpha")]));
    assert_eq!(units[1].baseline_commands, vec!["cargo fmt --check".to_string(), "cargo test".to_string()]);
    assert!(units[1].review_enabled);
    assert!(!units[1].publish_enabled, "publish: false must be honored");
    assert_eq!(units[1].target_branch.as_deref(), Some("release"));
}

#[test]
fn a_directory_without_a_plan_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(&root.join("alpha/plan.md"), "---\nid: alpha\n---\n");
    fs::create_dir_all(root.join("scratch")).unwrap();

    let loader = FsSpecLoader::new();
    let units = loader.discover_units(root).unwrap();
    assert_eq!(units.len(), 1);
}

#[test]
fn loads_tasks_sorted_by_ordinal_with_dependencies_and_backpressure() {
    let dir = tempfile::tempdir().unwrap();
    let unit_dir = dir.path().join("alpha");

    write(
        &unit_dir.join("plan.md"),
        "---\nid: alpha\n---\n",
    );
    write(
        &unit_dir.join("02-second.md"),
        "---\nordinal: 2\ntitle: Second task\ndepends_on: [1]\nbackpressure: test -f DONE\nstatus: pending\n---\nDo the second thing.\n",
    );
    write(
        &unit_dir.join("01-first.md"),
        "---\nordinal: 1\ntitle: First task\ndepends_on: []\nstatus: pending\n---\nDo the first thing.\n",
    );

    let loader = FsSpecLoader::new();
    let tasks = loader.load_tasks(&unit_dir).unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].ordinal, TaskOrdinal(1));
    assert_eq!(tasks[0].title, "First task");
    assert!(tasks[0].depends_on.is_empty());

    assert_eq!(tasks[1].ordinal, TaskOrdinal(2));
    assert_eq!(tasks[1].depends_on, BTreeSet::from([TaskOrdinal(1)]));
    assert_eq!(tasks[1].backpressure_command.as_deref(), Some("test -f DONE"));
}

#[test]
fn task_status_re_reads_the_marker_after_it_flips() {
    let dir = tempfile::tempdir().unwrap();
    let task_file = dir.path().join("01-first.md");
    write(&task_file, "---\nordinal: 1\ntitle: First task\nstatus: pending\n---\nBody.\n");

    let loader = FsSpecLoader::new();
    assert_eq!(loader.task_status(&task_file).unwrap(), TaskStatus::Pending);

    write(&task_file, "---\nordinal: 1\ntitle: First task\nstatus: complete\n---\nBody.\n");
    assert_eq!(loader.task_status(&task_file).unwrap(), TaskStatus::Complete);
}

#[test]
fn a_missing_frontmatter_block_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let task_file = dir.path().join("01-first.md");
    write(&task_file, "no frontmatter here\n");

    let loader = FsSpecLoader::new();
    assert!(matches!(loader.task_status(&task_file), Err(SpecLoadError::MissingFrontmatter { .. })));
}
