// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use warden_core::event::EventType;
use warden_core::test_support::test_event;
use warden_core::run::RunId;

#[test]
fn round_trips_through_a_line() {
    let event = test_event(RunId::new(), EventType::UnitStarted).with_unit("unit-a");
    let line = EventLine(event.clone()).to_line();

    assert!(line.ends_with('\n'));
    let decoded = EventLine::from_line(&line).unwrap();
    assert_eq!(decoded.run_id, event.run_id);
    assert_eq!(decoded.sequence, event.sequence);
    assert_eq!(decoded.unit, event.unit);
}

#[test]
fn each_line_is_exactly_one_json_object() {
    let event = test_event(RunId::new(), EventType::OrchCompleted);
    let line = EventLine(event).to_line();
    let trimmed = line.trim_end();
    assert!(serde_json::from_str::<serde_json::Value>(trimmed).unwrap().is_object());
    assert_eq!(trimmed.matches('\n').count(), 0);
}
