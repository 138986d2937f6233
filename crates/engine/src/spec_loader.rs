// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit-spec discovery (spec.md §6): reading the on-disk layout of units
//! and tasks under a run's `unit_spec_dir`.
//!
//! [`FsSpecLoader`] understands a minimal frontmatter convention -- a
//! `---`-delimited `key: value` block at the top of each Markdown file,
//! with `[a, b]`-style inline lists for dependency sets. A richer
//! YAML/TOML frontmatter parser is out of scope; this is just enough to
//! discover units, their dependencies, and their tasks.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use warden_core::task::{Task, TaskOrdinal, TaskStatus};
use warden_core::unit::UnitId;

#[derive(Debug, thiserror::Error)]
pub enum SpecLoadError {
    #[error("io error reading {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("{path} is missing a --- frontmatter block")]
    MissingFrontmatter { path: PathBuf },

    #[error("{path} frontmatter is missing required field {field}")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("{path} frontmatter field {field} has an invalid value: {value}")]
    InvalidField { path: PathBuf, field: &'static str, value: String },
}

/// A unit discovered on disk, before any task is read.
#[derive(Debug, Clone)]
pub struct DiscoveredUnit {
    pub id: UnitId,
    pub depends_on: BTreeSet<UnitId>,
    /// Overrides the run's target branch for this unit's publish stage, if set.
    pub target_branch: Option<String>,
    pub baseline_commands: Vec<String>,
    pub review_enabled: bool,
    /// Gates the worker's publish stage (push, open PR, merge -- spec.md
    /// §4.4 stage 5). Defaults to `true`: publishing is the ordinary path
    /// for a unit of real work. A unit-spec author can opt out with
    /// `publish: false` in `plan.md`'s frontmatter for units that should
    /// stop at a local commit (e.g. a scratch/throwaway unit).
    pub publish_enabled: bool,
    pub dir: PathBuf,
}

/// Discovers units and reads/re-reads their tasks from an on-disk layout.
/// Implemented once for real use ([`FsSpecLoader`]); the trait exists so
/// the worker and job manager can be exercised against an in-memory fake
/// in tests without touching a filesystem.
pub trait SpecLoader: Send + Sync + 'static {
    fn discover_units(&self, unit_spec_dir: &Path) -> Result<Vec<DiscoveredUnit>, SpecLoadError>;

    fn load_tasks(&self, unit_dir: &Path) -> Result<Vec<Task>, SpecLoadError>;

    /// Re-parse a single task's spec file to check its current status
    /// marker -- the worker's post-invocation recheck, and the thing
    /// `Effect::CheckTaskSpecMarker` asks the executor to do.
    fn task_status(&self, spec_file: &Path) -> Result<TaskStatus, SpecLoadError>;
}

/// Reads the layout `<unit_spec_dir>/<unit-id>/plan.md` (unit frontmatter)
/// plus `<unit_spec_dir>/<unit-id>/*.md` (one file per task, sorted by
/// filename for a stable default ordinal-independent order).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSpecLoader;

impl FsSpecLoader {
    pub fn new() -> Self {
        Self
    }
}

impl SpecLoader for FsSpecLoader {
    fn discover_units(&self, unit_spec_dir: &Path) -> Result<Vec<DiscoveredUnit>, SpecLoadError> {
        let mut units = Vec::new();
        let entries = std::fs::read_dir(unit_spec_dir).map_err(|source| SpecLoadError::Io { path: unit_spec_dir.to_path_buf(), source })?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let plan_path = dir.join("plan.md");
            if !plan_path.exists() {
                continue;
            }
            let content = read_to_string(&plan_path)?;
            let (fields, _body) = parse_frontmatter(&plan_path, &content)?;

            let dir_name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let id = UnitId::new(fields.get("id").cloned().unwrap_or(dir_name));
            let depends_on = fields
                .get("depends_on")
                .map(|v| parse_list(v, ','))
                .unwrap_or_default()
                .into_iter()
                .map(UnitId::new)
                .collect();
            let baseline_commands = fields.get("baseline_checks").map(|v| parse_list(v, ';')).unwrap_or_default();
            let review_enabled = fields.get("review").map(|v| v.trim() == "true").unwrap_or(false);
            let publish_enabled = fields.get("publish").map(|v| v.trim() == "true").unwrap_or(true);
            let target_branch = fields.get("target_branch").cloned();

            units.push(DiscoveredUnit { id, depends_on, target_branch, baseline_commands, review_enabled, publish_enabled, dir });
        }
        Ok(units)
    }

    fn load_tasks(&self, unit_dir: &Path) -> Result<Vec<Task>, SpecLoadError> {
        let entries = std::fs::read_dir(unit_dir).map_err(|source| SpecLoadError::Io { path: unit_dir.to_path_buf(), source })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().map(|e| e == "md").unwrap_or(false) && p.file_name().map(|n| n != "plan.md").unwrap_or(false))
            .collect();
        files.sort();

        let mut tasks = Vec::with_capacity(files.len());
        for file in files {
            tasks.push(self.parse_task_file(&file)?);
        }
        tasks.sort_by_key(|t| t.ordinal);
        Ok(tasks)
    }

    fn task_status(&self, spec_file: &Path) -> Result<TaskStatus, SpecLoadError> {
        Ok(self.parse_task_file(spec_file)?.status)
    }
}

impl FsSpecLoader {
    fn parse_task_file(&self, path: &Path) -> Result<Task, SpecLoadError> {
        let content = read_to_string(path)?;
        let (fields, _body) = parse_frontmatter(path, &content)?;

        let ordinal_str = fields.get("ordinal").ok_or_else(|| SpecLoadError::MissingField { path: path.to_path_buf(), field: "ordinal" })?;
        let ordinal = TaskOrdinal(
            ordinal_str
                .parse()
                .map_err(|_| SpecLoadError::InvalidField { path: path.to_path_buf(), field: "ordinal", value: ordinal_str.clone() })?,
        );
        let title = fields.get("title").cloned().unwrap_or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default());
        let depends_on: BTreeSet<TaskOrdinal> = fields
            .get("depends_on")
            .map(|v| parse_list(v, ','))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .map(TaskOrdinal)
            .collect();

        let mut task = Task::new(ordinal, title, path, depends_on);
        if let Some(cmd) = fields.get("backpressure") {
            if !cmd.is_empty() {
                task = task.with_backpressure_command(cmd.clone());
            }
        }
        if let Some(status) = fields.get("status") {
            task.status = parse_task_status(path, status)?;
        }
        Ok(task)
    }
}

fn parse_task_status(path: &Path, s: &str) -> Result<TaskStatus, SpecLoadError> {
    match s.trim() {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "complete" => Ok(TaskStatus::Complete),
        "failed" => Ok(TaskStatus::Failed),
        other => Err(SpecLoadError::InvalidField { path: path.to_path_buf(), field: "status", value: other.to_string() }),
    }
}

fn read_to_string(path: &Path) -> Result<String, SpecLoadError> {
    std::fs::read_to_string(path).map_err(|source| SpecLoadError::Io { path: path.to_path_buf(), source })
}

/// Split a `---\n...\n---\n` frontmatter block from the remaining body,
/// parsing the block as flat `key: value` lines.
fn parse_frontmatter(path: &Path, content: &str) -> Result<(std::collections::HashMap<String, String>, String), SpecLoadError> {
    let trimmed = content.trim_start();
    let rest = trimmed
        .strip_prefix("---\n")
        .or_else(|| trimmed.strip_prefix("---\r\n"))
        .ok_or_else(|| SpecLoadError::MissingFrontmatter { path: path.to_path_buf() })?;
    let end = rest.find("\n---").ok_or_else(|| SpecLoadError::MissingFrontmatter { path: path.to_path_buf() })?;
    let (frontmatter, remainder) = rest.split_at(end);
    let body = remainder.trim_start_matches("\n---").trim_start_matches(['\r', '\n']).to_string();

    let mut fields = std::collections::HashMap::new();
    for line in frontmatter.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok((fields, body))
}

/// Parse a `[a, b, c]` inline list, or `[]`/empty for no entries.
fn parse_list(raw: &str, sep: char) -> Vec<String> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
#[path = "spec_loader_tests.rs"]
mod tests;
