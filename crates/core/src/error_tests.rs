// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::run::{Run, RunConfig, RunStatus};
use crate::unit::{Unit, UnitKey, UnitStatus};

#[test]
fn run_transition_error_converts_into_core_error() {
    let mut run = Run::new(RunConfig::builder("/repo", "main").build(), 1);
    let err: CoreError = run.transition(RunStatus::Completed, 2, None).unwrap_err().into();
    assert!(matches!(err, CoreError::RunTransition(_)));
}

#[test]
fn unit_transition_error_converts_into_core_error() {
    let mut unit = Unit::new(UnitKey::new(crate::run::RunId::new(), "alpha"), Default::default());
    let err: CoreError = unit.transition(UnitStatus::InProgress, 2, None, None).unwrap_err().into();
    assert!(matches!(err, CoreError::UnitTransition(_)));
}

#[test]
fn cyclic_dag_error_message_names_the_cycle() {
    let err = CoreError::CyclicDag(vec!["x".to_string(), "y".to_string()]);
    assert!(err.to_string().contains("x"));
    assert!(err.to_string().contains("y"));
}

#[test]
fn scheduler_deadlock_has_a_fixed_message() {
    assert_eq!(
        CoreError::SchedulerDeadlock.to_string(),
        "no units ready but run is not complete -- contract violation (cyclic deps escaped Build() validation)"
    );
}
