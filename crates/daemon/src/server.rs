// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-plane socket server (spec.md §6): accepts connections on a
//! Unix domain socket created with owner-only (0600) permissions, and
//! dispatches each framed [`Request`] to the shared [`WardenJobManager`].
//!
//! `WatchJob` is the one streaming operation: once accepted, the
//! connection handler keeps writing framed [`Response::JobEvent`] messages
//! without waiting for further requests, until the run reaches a terminal
//! status ([`Response::JobTerminal`]) or the peer disconnects.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use warden_core::run::RunStatus;
use warden_wire::request::Request;
use warden_wire::response::{HealthPayload, Response};
use warden_wire::{read_message, write_message};

use crate::capabilities::WardenJobManager;
use crate::env::PROTOCOL_VERSION;
use crate::error::DaemonError;

/// Bind the control socket, removing a stale socket file left behind by a
/// prior unclean shutdown first (the PID lock, acquired before this, is
/// what actually proves no live peer owns it). Permissions are narrowed to
/// owner-only immediately after bind, closing the window where another
/// local user could connect.
pub fn bind(socket_path: &Path) -> Result<UnixListener, DaemonError> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener =
        UnixListener::bind(socket_path).map_err(|source| DaemonError::BindFailed { path: socket_path.to_path_buf(), source })?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Accept connections until `stop_accepting` is cancelled, spawning one
/// task per connection. `shutdown_requested` is a separate, earlier signal:
/// an in-band `Shutdown` request cancels it to wake up the daemon's own
/// shutdown sequence (spec.md §4.5 step 1, "cancel all running jobs
/// first"), while this listener and any in-flight `WatchJob` streams keep
/// running -- draining them is steps 2-3, not this call's job.
pub async fn serve(
    listener: UnixListener,
    jobs: Arc<WardenJobManager>,
    shutdown_requested: CancellationToken,
    stop_accepting: CancellationToken,
    started_at: Instant,
) {
    loop {
        tokio::select! {
            _ = stop_accepting.cancelled() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let jobs = jobs.clone();
                        let shutdown_requested = shutdown_requested.clone();
                        let stop_accepting = stop_accepting.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, jobs, shutdown_requested, stop_accepting, started_at).await {
                                tracing::debug!(error = %err, "control connection ended with an error");
                            }
                        });
                    }
                    Err(err) => tracing::error!(error = %err, "accept failed on control socket"),
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    jobs: Arc<WardenJobManager>,
    shutdown_requested: CancellationToken,
    stop_accepting: CancellationToken,
    started_at: Instant,
) -> Result<(), warden_wire::error::ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let request: Request = tokio::select! {
            _ = stop_accepting.cancelled() => return Ok(()),
            request = read_message(&mut reader) => request?,
        };

        match request {
            Request::Ping => write_message(&mut writer, &Response::Pong).await?,

            Request::Hello { client_version } => {
                tracing::debug!(%client_version, "client handshake");
                write_message(&mut writer, &Response::Hello { server_version: PROTOCOL_VERSION.to_string() }).await?;
            }

            Request::Health => {
                let health = HealthPayload {
                    version: PROTOCOL_VERSION.to_string(),
                    active_jobs: jobs.active_count() as u32,
                    uptime_secs: started_at.elapsed().as_secs(),
                };
                write_message(&mut writer, &Response::Health { health }).await?;
            }

            Request::StartJob { config } => {
                let response = match jobs.start(config).await {
                    Ok(run_id) => Response::JobStarted { run_id },
                    Err(err) => Response::Error { message: err.to_string() },
                };
                write_message(&mut writer, &response).await?;
            }

            Request::StopJob { run_id } => {
                let response = match jobs.stop(run_id) {
                    Ok(()) => Response::JobStopped { run_id },
                    Err(err) => Response::Error { message: err.to_string() },
                };
                write_message(&mut writer, &response).await?;
            }

            Request::GetJobStatus { run_id } => {
                let response = match jobs.get(run_id) {
                    Ok(detail) => Response::JobStatus { detail },
                    Err(err) => Response::Error { message: err.to_string() },
                };
                write_message(&mut writer, &response).await?;
            }

            Request::ListJobs { status } => {
                let response = match jobs.list(status) {
                    Ok(jobs) => Response::JobList { jobs },
                    Err(err) => Response::Error { message: err.to_string() },
                };
                write_message(&mut writer, &response).await?;
            }

            Request::WatchJob { run_id, from_seq } => {
                stream_job(&mut writer, &jobs, run_id, from_seq, &stop_accepting).await?;
                return Ok(());
            }

            Request::Shutdown => {
                write_message(&mut writer, &Response::ShuttingDown).await?;
                shutdown_requested.cancel();
                return Ok(());
            }
        }
    }
}

/// Drive the `WatchJob` streaming response: replay-then-live if the job is
/// still live, a direct replay-from-store plus an immediate terminal
/// message if it has already finished (spec.md §4.5: `subscribe` returns
/// `JobNotFound` for an archived run; the daemon papers over that split so
/// the wire contract is uniform for the caller).
async fn stream_job<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    jobs: &WardenJobManager,
    run_id: warden_core::run::RunId,
    from_seq: Option<u64>,
    stop_accepting: &CancellationToken,
) -> Result<(), warden_wire::error::ProtocolError> {
    match jobs.subscribe(run_id, from_seq) {
        Ok(subscription) => loop {
            tokio::select! {
                _ = stop_accepting.cancelled() => return Ok(()),
                event = subscription.recv() => {
                    match event {
                        Some(event) => {
                            let terminal = is_run_terminal_event(&event.event_type);
                            write_message(writer, &Response::JobEvent { event }).await?;
                            if terminal {
                                if let Ok(detail) = jobs.get(run_id) {
                                    write_message(writer, &Response::JobTerminal { run_id, status: detail.status }).await?;
                                }
                                return Ok(());
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        },
        Err(_not_found) => {
            let events = jobs.events_since(run_id, from_seq.unwrap_or(1)).unwrap_or_default();
            for event in events {
                write_message(writer, &Response::JobEvent { event }).await?;
            }
            let status = jobs.get(run_id).map(|detail| detail.status).unwrap_or(RunStatus::Failed);
            write_message(writer, &Response::JobTerminal { run_id, status }).await?;
            Ok(())
        }
    }
}

fn is_run_terminal_event(event_type: &warden_core::event::EventType) -> bool {
    use warden_core::event::EventType::*;
    matches!(event_type, OrchCompleted | OrchFailed)
}
