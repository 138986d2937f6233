// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn default_config_has_sane_worker_policy_values() {
    let cfg = WardenConfig::default();
    assert_eq!(cfg.default_parallelism, 1);
    assert_eq!(cfg.max_claude_retries, 3);
    assert_eq!(cfg.max_baseline_retries, 3);
    assert_eq!(cfg.max_fix_iterations, 3);
    assert_eq!(cfg.event_retention, EventRetention::Forever);
    assert_eq!(cfg.merge_policy, MergePolicy::Local);
}

#[test]
fn state_dir_defaults_to_dotwarden_under_workspace_root() {
    let cfg = WardenConfig::default();
    let root = std::path::Path::new("/repo/checkout");
    assert_eq!(cfg.resolve_state_dir(root), root.join(".warden"));
}

#[test]
fn explicit_state_dir_override_wins() {
    let mut cfg = WardenConfig::default();
    cfg.state_dir = Some(PathBuf::from("/var/lib/warden"));
    let root = std::path::Path::new("/repo/checkout");
    assert_eq!(cfg.resolve_state_dir(root), PathBuf::from("/var/lib/warden"));
}

#[test]
fn socket_path_defaults_under_the_resolved_state_dir() {
    let cfg = WardenConfig::default();
    let root = std::path::Path::new("/repo/checkout");
    assert_eq!(cfg.resolve_socket_path(root), root.join(".warden").join("daemon.sock"));
}

#[test]
fn config_round_trips_through_json() {
    let cfg = WardenConfig::default();
    let json = serde_json::to_string(&cfg).unwrap();
    let parsed: WardenConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.default_parallelism, cfg.default_parallelism);
    assert_eq!(parsed.retry, cfg.retry);
}

#[test]
fn missing_fields_fall_back_to_defaults_via_serde_default() {
    let parsed: WardenConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(parsed.default_parallelism, WardenConfig::default().default_parallelism);
}
