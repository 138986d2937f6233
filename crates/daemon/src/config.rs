// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration loading: a `WardenConfig` (the engine's own
//! ambient policy knobs) plus the paths this process derives from the
//! workspace root it's bound to (SPEC_FULL.md §6: "Persistence on disk").

use std::path::{Path, PathBuf};

use warden_core::config::WardenConfig;

use crate::error::DaemonError;

/// Everything `wardend` needs to start: the workspace root it serves, the
/// resolved `WardenConfig`, and the concrete on-disk paths derived from
/// both.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub state_dir: PathBuf,
    pub db_path: PathBuf,
    pub pid_path: PathBuf,
    pub socket_path: PathBuf,
    pub log_path: PathBuf,
}

impl DaemonPaths {
    pub fn resolve(workspace_root: &Path, config: &WardenConfig) -> Self {
        let state_dir = config.resolve_state_dir(workspace_root);
        Self {
            db_path: warden_storage::Store::db_path(&state_dir),
            pid_path: state_dir.join("wardend.pid"),
            socket_path: config.resolve_socket_path(workspace_root),
            log_path: state_dir.join("wardend.log"),
            state_dir,
        }
    }
}

/// Load a [`WardenConfig`] from a TOML file, falling back to defaults if
/// `path` is `None`. An explicit path that fails to parse is a startup
/// error (exit code 1); a path that simply doesn't exist is treated the
/// same as "no config file given".
pub fn load_config(path: Option<&Path>) -> Result<WardenConfig, DaemonError> {
    let Some(path) = path else {
        return Ok(WardenConfig::default());
    };
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(WardenConfig::default()),
        Err(err) => return Err(err.into()),
    };
    toml::from_str(&contents).map_err(|source| DaemonError::Config { path: path.to_path_buf(), source })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
