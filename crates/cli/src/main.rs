// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `warden`: the thin client over `wardend`'s control socket.
//!
//! Every subcommand here is a direct translation of one [`Request`]
//! variant (plus `daemon start`/`stop`, which manage the `wardend`
//! process itself rather than a run). There is no local state: all of it
//! lives in the daemon.

mod client;
mod color;
mod exit_error;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use warden_core::run::{RunConfig, RunId, RunStatus};
use warden_daemon::config::{load_config, DaemonPaths};
use warden_wire::request::Request;
use warden_wire::response::Response;

use crate::client::WardenClient;
use crate::exit_error::ExitError;
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "warden", version, about = "Thin client for the warden orchestrator daemon", styles = color::styles())]
struct Cli {
    /// Workspace root the target daemon serves. Defaults to the current
    /// directory.
    #[arg(long, global = true)]
    workspace_root: Option<PathBuf>,

    /// Path to a warden.toml overriding the daemon's defaults. Only
    /// consulted by `daemon start` and when deriving the socket path --
    /// it is never sent over the wire.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for commands that print structured data.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new run.
    Start {
        /// Branch the run's units are merged onto.
        target_branch: String,
        /// Directory of unit spec files, relative to the workspace root.
        #[arg(long, default_value = "tasks")]
        unit_spec_dir: PathBuf,
        /// Maximum units to run concurrently within this run.
        #[arg(long, default_value_t = 1)]
        parallelism: u32,
    },
    /// Cancel a running job.
    Stop { run_id: RunId },
    /// Fetch one run's current status.
    Status { run_id: RunId },
    /// List runs, optionally filtered by status.
    List {
        #[arg(long, value_enum)]
        status: Option<CliRunStatus>,
    },
    /// Stream a run's events until it reaches a terminal status.
    Watch {
        run_id: RunId,
        /// Replay persisted events from this sequence number before
        /// switching to live delivery.
        #[arg(long)]
        from_seq: Option<u64>,
    },
    /// Daemon liveness and version probe.
    Health,
    /// Round-trip to confirm the daemon is reachable.
    Ping,
    /// Manage the `wardend` process itself.
    #[command(subcommand)]
    Daemon(DaemonCommand),
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Start `wardend` in the background if it isn't already running.
    Start,
    /// Request an orderly shutdown.
    Stop,
    /// Print daemon version and active job count.
    Status,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<CliRunStatus> for RunStatus {
    fn from(value: CliRunStatus) -> Self {
        match value {
            CliRunStatus::Pending => RunStatus::Pending,
            CliRunStatus::Running => RunStatus::Running,
            CliRunStatus::Completed => RunStatus::Completed,
            CliRunStatus::Failed => RunStatus::Failed,
            CliRunStatus::Cancelled => RunStatus::Cancelled,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        let code = err.downcast_ref::<ExitError>().map(|e| e.code).unwrap_or(1);
        std::process::exit(code);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run(cli: Cli) -> Result<()> {
    let workspace_root = cli.workspace_root.unwrap_or(std::env::current_dir().context("reading current directory")?);
    let config = load_config(cli.config.as_deref())?;
    let paths = DaemonPaths::resolve(&workspace_root, &config);
    let format = cli.format;

    match cli.command {
        Command::Daemon(DaemonCommand::Start) => daemon_start(&workspace_root, &paths, cli.config.as_ref()).await,
        Command::Daemon(DaemonCommand::Stop) => {
            let mut client = connect(&paths, &workspace_root).await?;
            client.request(&Request::Shutdown).await?;
            println!("shutdown requested");
            Ok(())
        }
        Command::Daemon(DaemonCommand::Status) => {
            let mut client = connect(&paths, &workspace_root).await?;
            match client.request(&Request::Health).await? {
                Response::Health { health } => output::print_health(format, &health),
                other => Err(unexpected(other)),
            }
        }
        Command::Ping => {
            let mut client = connect(&paths, &workspace_root).await?;
            match client.request(&Request::Ping).await? {
                Response::Pong => {
                    println!("pong");
                    Ok(())
                }
                other => Err(unexpected(other)),
            }
        }
        Command::Health => {
            let mut client = connect(&paths, &workspace_root).await?;
            match client.request(&Request::Health).await? {
                Response::Health { health } => output::print_health(format, &health),
                other => Err(unexpected(other)),
            }
        }
        Command::Start { target_branch, unit_spec_dir, parallelism } => {
            let mut client = connect(&paths, &workspace_root).await?;
            let run_config = RunConfig::builder(workspace_root.clone(), target_branch).unit_spec_dir(unit_spec_dir).parallelism(parallelism).build();
            match client.request(&Request::StartJob { config: run_config }).await? {
                Response::JobStarted { run_id } => {
                    println!("{run_id}");
                    Ok(())
                }
                Response::Error { message } => Err(anyhow!(message)),
                other => Err(unexpected(other)),
            }
        }
        Command::Stop { run_id } => {
            let mut client = connect(&paths, &workspace_root).await?;
            match client.request(&Request::StopJob { run_id }).await? {
                Response::JobStopped { run_id } => {
                    println!("stopped {run_id}");
                    Ok(())
                }
                Response::Error { message } => Err(anyhow!(message)),
                other => Err(unexpected(other)),
            }
        }
        Command::Status { run_id } => {
            let mut client = connect(&paths, &workspace_root).await?;
            match client.request(&Request::GetJobStatus { run_id }).await? {
                Response::JobStatus { detail } => output::print_job_detail(format, &detail),
                Response::Error { message } => Err(anyhow!(message)),
                other => Err(unexpected(other)),
            }
        }
        Command::List { status } => {
            let mut client = connect(&paths, &workspace_root).await?;
            match client.request(&Request::ListJobs { status: status.map(Into::into) }).await? {
                Response::JobList { jobs } => output::print_job_list(format, &jobs),
                Response::Error { message } => Err(anyhow!(message)),
                other => Err(unexpected(other)),
            }
        }
        Command::Watch { run_id, from_seq } => {
            let client = connect(&paths, &workspace_root).await?;
            client
                .watch(run_id, from_seq, |response| match response {
                    Response::JobEvent { event } => println!("{} {:?}", event.sequence, event.event_type),
                    Response::JobTerminal { status, .. } => println!("terminal: {status:?}"),
                    _ => {}
                })
                .await
        }
    }
}

async fn connect(paths: &DaemonPaths, workspace_root: &std::path::Path) -> Result<WardenClient> {
    WardenClient::connect(&paths.socket_path).await.map_err(|_| ExitError::daemon_unreachable(workspace_root).into())
}

async fn daemon_start(workspace_root: &std::path::Path, paths: &DaemonPaths, config_path: Option<&PathBuf>) -> Result<()> {
    if WardenClient::connect(&paths.socket_path).await.is_ok() {
        println!("wardend already running for {}", workspace_root.display());
        return Ok(());
    }
    client::spawn_daemon(workspace_root, config_path)?;
    WardenClient::connect_with_retry(&paths.socket_path, 50, Duration::from_millis(100))
        .await
        .context("wardend did not open its control socket in time")?;
    println!("wardend started for {}", workspace_root.display());
    Ok(())
}

fn unexpected(response: Response) -> anyhow::Error {
    anyhow!("unexpected response from daemon: {response:?}")
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
