// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use std::sync::Arc;

fn sink() -> (Arc<Mutex<Vec<OutputLine>>>, impl Fn(OutputLine) + Send + Sync) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let captured = lines.clone();
    (lines, move |line: OutputLine| captured.lock().push(line))
}

#[tokio::test]
async fn runs_a_trivial_command_and_captures_exit_code() {
    // `true` exits 0 unconditionally and exists on every POSIX system used
    // to run this test suite.
    let provider = ClaudeCliProvider { binary: "true".into(), extra_args: vec![], skip_permissions_flag: String::new() };
    let (_lines, observe) = sink();
    let outcome = provider
        .invoke(
            ProviderRequest { prompt: "go".into(), workdir: std::env::temp_dir(), timeout: Duration::from_secs(5) },
            &observe,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, ProviderOutcome::Completed { exit_code: 0 });
}

#[tokio::test]
async fn nonzero_exit_is_reported_not_treated_as_an_error() {
    let provider = ClaudeCliProvider { binary: "false".into(), extra_args: vec![], skip_permissions_flag: String::new() };
    let (_lines, observe) = sink();
    let outcome = provider
        .invoke(
            ProviderRequest { prompt: "go".into(), workdir: std::env::temp_dir(), timeout: Duration::from_secs(5) },
            &observe,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, ProviderOutcome::Completed { exit_code: 1 });
}

#[tokio::test]
async fn cancellation_wins_over_a_long_running_process() {
    let provider = ClaudeCliProvider { binary: "sleep".into(), extra_args: vec!["5".into()], skip_permissions_flag: String::new() };
    let (_lines, observe) = sink();
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let result = provider
        .invoke(
            ProviderRequest { prompt: "go".into(), workdir: std::env::temp_dir(), timeout: Duration::from_secs(30) },
            &observe,
            cancel,
        )
        .await;

    assert!(matches!(result, Err(ProviderError::Cancelled)));
}

#[tokio::test]
async fn spawn_failure_for_a_missing_binary_is_reported() {
    let provider = ClaudeCliProvider {
        binary: "/nonexistent/definitely-not-a-binary".into(),
        extra_args: vec![],
        skip_permissions_flag: String::new(),
    };
    let (_lines, observe) = sink();
    let result = provider
        .invoke(
            ProviderRequest { prompt: "go".into(), workdir: std::env::temp_dir(), timeout: Duration::from_secs(5) },
            &observe,
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(ProviderError::Spawn(_))));
}
