// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardend`'s own orchestration: load configuration, take the
//! single-instance lock, open the store, wire up the capability set, bind
//! the control socket, and run until asked to stop -- then unwind in the
//! exact order spec.md §4.5 requires.

pub mod capabilities;
pub mod config;
pub mod env;
pub mod error;
pub mod pid_lock;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::capabilities::{build_job_manager, WardenJobManager};
use crate::config::{load_config, DaemonPaths};
use crate::error::DaemonError;
use crate::pid_lock::PidLock;

/// Run `wardend` against `workspace_root` until shutdown, returning once
/// every step of the shutdown sequence has run to completion. The single
/// entry point `main.rs` calls into -- kept separate from it so the
/// startup/shutdown sequence itself is unit-testable without a process
/// boundary.
pub async fn run(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<(), DaemonError> {
    let config = load_config(config_path.as_deref())?;
    let paths = DaemonPaths::resolve(&workspace_root, &config);
    std::fs::create_dir_all(&paths.state_dir)?;

    // Single-instance guard first: a second `wardend` pointed at the same
    // state dir must fail fast, before it touches the database or socket
    // of a still-running peer.
    let lock = PidLock::acquire(&paths.pid_path)?;

    let store = warden_storage::Store::open(&paths.db_path)?;
    let jobs = Arc::new(build_job_manager(store, config));

    let resumed = jobs.resume_jobs().await;
    if !resumed.is_empty() {
        tracing::info!(count = resumed.len(), "resumed in-flight runs from a prior session");
    }

    let listener = server::bind(&paths.socket_path)?;
    let started_at = Instant::now();

    // Two tokens, not one: `shutdown_requested` only wakes this function
    // up to begin unwinding; `stop_accepting` is what actually halts the
    // control socket, and is cancelled later, after jobs have had a chance
    // to drain (spec.md §4.5).
    let shutdown_requested = CancellationToken::new();
    let stop_accepting = CancellationToken::new();

    let serve_task =
        tokio::spawn(server::serve(listener, jobs.clone(), shutdown_requested.clone(), stop_accepting.clone(), started_at));

    wait_for_shutdown_signal(shutdown_requested).await;
    tracing::info!("shutdown sequence starting");

    // 1. Cancel all running jobs.
    jobs.stop_all();

    // 2. Wait bounded for workers to observe cancellation.
    wait_for_drain(&jobs, crate::env::shutdown_drain_timeout()).await;

    // 3. Stop the RPC server.
    stop_accepting.cancel();
    let _ = serve_task.await;

    // 4. No separate live-broadcast hub in this daemon: each run's bus is
    // owned by its `JobManager` entry and is torn down with it.

    // 5. Close the store: dropping the last `Arc<JobManager>` drops its
    // `Store`, which drops the last clone of the underlying connection.
    drop(jobs);

    // 6. Release the single-instance lock.
    drop(lock);

    // 7. Remove the socket file so a stale entry doesn't greet the next
    // client with a connection refused instead of "no daemon running".
    let _ = std::fs::remove_file(&paths.socket_path);

    tracing::info!("daemon stopped");
    Ok(())
}

/// Block until either the OS asks us to stop (SIGTERM/SIGINT, or Ctrl-C on
/// platforms without `tokio::signal::unix`) or a client sends an in-band
/// `Shutdown` request.
#[cfg(unix)]
async fn wait_for_shutdown_signal(shutdown_requested: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            shutdown_requested.cancelled().await;
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            shutdown_requested.cancelled().await;
            return;
        }
    };

    tokio::select! {
        _ = shutdown_requested.cancelled() => tracing::info!("shutdown requested over the control socket"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal(shutdown_requested: CancellationToken) {
    tokio::select! {
        _ = shutdown_requested.cancelled() => tracing::info!("shutdown requested over the control socket"),
        _ = tokio::signal::ctrl_c() => tracing::info!("received ctrl-c"),
    }
}

/// Poll `jobs.active_count()` down to zero, giving up after `timeout` --
/// a job that ignores cancellation (stuck in a non-interruptible call)
/// must not block shutdown forever.
async fn wait_for_drain(jobs: &WardenJobManager, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let active = jobs.active_count();
        if active == 0 || Instant::now() >= deadline {
            if active > 0 {
                tracing::warn!(active, "shutdown drain window elapsed with jobs still active");
            }
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
