// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn simple_task(n: u32, deps: &[u32]) -> Task {
    Task::new(
        TaskOrdinal(n),
        format!("task {n}"),
        format!("tasks/{n}.md"),
        deps.iter().map(|d| TaskOrdinal(*d)).collect(),
    )
}

#[test]
fn task_with_no_deps_is_ready_immediately() {
    let t = simple_task(1, &[]);
    assert!(t.is_ready(&Default::default()));
}

#[test]
fn task_with_unmet_deps_is_not_ready() {
    let t = simple_task(2, &[1]);
    assert!(!t.is_ready(&Default::default()));
}

#[test]
fn task_becomes_ready_once_deps_complete() {
    let t = simple_task(2, &[1]);
    let mut completed = std::collections::HashSet::new();
    completed.insert(TaskOrdinal(1));
    assert!(t.is_ready(&completed));
}

#[test]
fn in_progress_or_complete_tasks_are_never_ready() {
    let mut t = simple_task(1, &[]);
    t.mark_in_progress();
    assert!(!t.is_ready(&Default::default()));
    t.mark_complete();
    assert!(!t.is_ready(&Default::default()));
}

#[test]
fn mark_in_progress_increments_attempt_each_call() {
    let mut t = simple_task(1, &[]);
    t.mark_in_progress();
    t.mark_in_progress();
    assert_eq!(t.attempt, 2);
    assert_eq!(t.status, TaskStatus::InProgress);
}

#[test]
fn ready_tasks_filters_a_units_whole_task_list() {
    let tasks = vec![simple_task(1, &[]), simple_task(2, &[1]), simple_task(3, &[])];
    let ready = ready_tasks(&tasks);
    let ordinals: Vec<u32> = ready.iter().map(|t| t.ordinal.0).collect();
    assert_eq!(ordinals, vec![1, 3]);
}

#[test]
fn ready_tasks_includes_downstream_once_upstream_completes() {
    let mut tasks = vec![simple_task(1, &[]), simple_task(2, &[1])];
    tasks[0].mark_in_progress();
    tasks[0].mark_complete();
    let ready = ready_tasks(&tasks);
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].ordinal, TaskOrdinal(2));
}

#[test]
fn all_complete_is_false_until_every_task_is_complete() {
    let mut tasks = vec![simple_task(1, &[]), simple_task(2, &[])];
    assert!(!all_complete(&tasks));
    tasks[0].mark_complete();
    assert!(!all_complete(&tasks));
    tasks[1].mark_complete();
    assert!(all_complete(&tasks));
}

#[test]
fn any_failed_detects_a_single_failed_task() {
    let mut tasks = vec![simple_task(1, &[]), simple_task(2, &[])];
    assert!(!any_failed(&tasks));
    tasks[1].mark_failed();
    assert!(any_failed(&tasks));
}

#[test]
fn with_backpressure_command_sets_the_optional_field() {
    let t = simple_task(1, &[]).with_backpressure_command("exit 0");
    assert_eq!(t.backpressure_command.as_deref(), Some("exit 0"));
}
