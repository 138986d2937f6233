// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use warden_core::test_support::test_run_config;

#[test]
fn start_job_round_trips_through_json() {
    let req = Request::StartJob { config: test_run_config() };
    let json = serde_json::to_string(&req).unwrap();
    let decoded: Request = serde_json::from_str(&json).unwrap();
    assert!(matches!(decoded, Request::StartJob { .. }));
}

#[test]
fn tag_field_names_the_operation() {
    let json = serde_json::to_value(Request::Health).unwrap();
    assert_eq!(json["op"], "health");
}

#[test]
fn watch_job_carries_an_optional_resume_sequence() {
    let run_id = RunId::new();
    let req = Request::WatchJob { run_id, from_seq: Some(42) };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["from_seq"], 42);
}
