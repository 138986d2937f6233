// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text/JSON rendering of wire payloads. Kept to the handful of shapes
//! `warden-wire` actually defines -- there is no table layout engine here,
//! just enough formatting that a human and a script can both use the
//! output.

use clap::ValueEnum;
use serde::Serialize;
use warden_wire::response::{HealthPayload, JobDetailPayload, JobSummaryPayload};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_job_summary(format: OutputFormat, job: &JobSummaryPayload) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(job),
        OutputFormat::Text => {
            println!(
                "{}  {:<10?}  {}/{}  {}  {}",
                job.run_id, job.status, job.units_complete, job.units_total, job.target_branch, job.workspace_root
            );
            Ok(())
        }
    }
}

pub fn print_job_list(format: OutputFormat, jobs: &[JobSummaryPayload]) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&jobs),
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("no runs");
                return Ok(());
            }
            for job in jobs {
                print_job_summary(format, job)?;
            }
            Ok(())
        }
    }
}

pub fn print_job_detail(format: OutputFormat, detail: &JobDetailPayload) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(detail),
        OutputFormat::Text => {
            println!("run       {}", detail.run_id);
            println!("status    {:?}", detail.status);
            println!("branch    {}", detail.target_branch);
            println!("workspace {}", detail.workspace_root);
            if let Some(error) = &detail.error {
                println!("error     {error}");
            }
            println!("units:");
            for unit in &detail.units {
                let branch = unit.branch.as_deref().unwrap_or("-");
                println!("  {:<24} {:<10?} {}", unit.unit_id, unit.status, branch);
                if let Some(error) = &unit.error {
                    println!("    error: {error}");
                }
            }
            Ok(())
        }
    }
}

pub fn print_health(format: OutputFormat, health: &HealthPayload) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(health),
        OutputFormat::Text => {
            println!("wardend {} -- {} active job(s), up {}s", health.version, health.active_jobs, health.uptime_secs);
            Ok(())
        }
    }
}
