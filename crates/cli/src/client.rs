// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The thin client's only link to `wardend`: connect to its Unix control
//! socket and exchange framed [`Request`]/[`Response`] pairs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use warden_wire::request::Request;
use warden_wire::response::Response;
use warden_wire::{read_message, write_message};

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A single control-socket connection. Not pooled or reused across
/// commands -- each CLI invocation is a fresh process making one or two
/// round trips, so there's nothing to amortize.
pub struct WardenClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl WardenClient {
    /// Connect to the daemon serving `workspace_root`. Returns an error a
    /// caller can tell apart from "request failed" so `warden daemon
    /// start` and friends can decide whether to spawn a new daemon.
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("connecting to {}", socket_path.display()))?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    /// Like [`Self::connect`], but tries a handful of times with a short
    /// backoff -- used right after spawning a fresh daemon, whose socket
    /// isn't guaranteed to exist the instant the process starts.
    pub async fn connect_with_retry(socket_path: &Path, attempts: u32, delay: Duration) -> Result<Self> {
        let mut last_err = None;
        for _ in 0..attempts {
            match Self::connect(socket_path).await {
                Ok(client) => return Ok(client),
                Err(err) => last_err = Some(err),
            }
            tokio::time::sleep(delay).await;
        }
        Err(last_err.unwrap_or_else(|| anyhow!("never attempted a connection")))
    }

    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        write_message(&mut self.writer, request).await.context("writing request")?;
        read_message(&mut self.reader).await.context("reading response")
    }

    pub async fn hello(&mut self) -> Result<String> {
        match self.request(&Request::Hello { client_version: CLIENT_VERSION.to_string() }).await? {
            Response::Hello { server_version } => Ok(server_version),
            other => Err(unexpected(&other)),
        }
    }

    /// Read framed [`Response::JobEvent`] messages until
    /// [`Response::JobTerminal`], calling `on_event` for each one. Leaves
    /// the connection in whatever state the daemon closes it in --
    /// callers issue no further requests on this connection afterward.
    pub async fn watch(mut self, run_id: warden_core::run::RunId, from_seq: Option<u64>, mut on_event: impl FnMut(&Response)) -> Result<()> {
        let first = self.request(&Request::WatchJob { run_id, from_seq }).await?;
        if let Response::Error { message } = first {
            return Err(anyhow!(message));
        }
        if !matches!(first, Response::JobEvent { .. } | Response::JobTerminal { .. }) {
            return Err(unexpected(&first));
        }
        let mut terminal = matches!(first, Response::JobTerminal { .. });
        on_event(&first);
        while !terminal {
            let response: Response = read_message(&mut self.reader).await.context("reading watch event")?;
            terminal = matches!(response, Response::JobTerminal { .. });
            on_event(&response);
        }
        Ok(())
    }
}

fn unexpected(response: &Response) -> anyhow::Error {
    anyhow!("unexpected response from daemon: {response:?}")
}

/// Spawn `wardend` detached against `workspace_root` and wait for its
/// socket to accept connections. Mirrors the daemon's own argument
/// parsing: a bare workspace-root positional, an optional `--config`.
pub fn spawn_daemon(workspace_root: &Path, config_path: Option<&PathBuf>) -> Result<()> {
    let mut command = std::process::Command::new("wardend");
    command.arg(workspace_root);
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    command.stdin(std::process::Stdio::null()).stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null());
    command.spawn().context("spawning wardend (is it installed and on PATH?)")?;
    Ok(())
}
