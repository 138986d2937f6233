// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn worker_default_matches_the_documented_policy() {
    let cfg = RetryConfig::worker_default();
    assert_eq!(cfg.initial_delay, Duration::from_secs(1));
    assert_eq!(cfg.multiplier, 2.0);
    assert_eq!(cfg.max_delay, Duration::from_secs(30));
    assert_eq!(cfg.max_attempts, 3);
}

#[test]
fn delay_doubles_each_attempt_until_the_cap() {
    let cfg = RetryConfig::worker_default();
    assert_eq!(cfg.delay_for_attempt(0), Duration::ZERO);
    assert_eq!(cfg.delay_for_attempt(1), Duration::from_secs(1));
    assert_eq!(cfg.delay_for_attempt(2), Duration::from_secs(2));
    assert_eq!(cfg.delay_for_attempt(3), Duration::from_secs(4));
}

#[test]
fn delay_never_exceeds_max_delay() {
    let cfg = RetryConfig::worker_default();
    assert_eq!(cfg.delay_for_attempt(10), Duration::from_secs(30));
}

#[test]
fn exhaustion_is_reached_at_max_attempts() {
    let cfg = RetryConfig::worker_default();
    assert!(!cfg.is_exhausted(0));
    assert!(!cfg.is_exhausted(2));
    assert!(cfg.is_exhausted(3));
    assert!(cfg.is_exhausted(4));
}

#[test]
fn default_impl_matches_worker_default() {
    assert_eq!(RetryConfig::default(), RetryConfig::worker_default());
}
