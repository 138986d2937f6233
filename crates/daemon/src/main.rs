// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardend`: the orchestrator daemon binary.
//!
//! Typically started by `warden-cli` against a workspace root and left
//! running in the background; it listens on a Unix socket for commands
//! and should not normally be invoked by hand.

use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (workspace_root, config_path) = match parse_args(&args) {
        ArgsOutcome::Run { workspace_root, config_path } => (workspace_root, config_path),
        ArgsOutcome::PrintAndExit(message) => {
            println!("{message}");
            std::process::exit(0);
        }
        ArgsOutcome::Error(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start the async runtime: {err}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let log_path = warden_daemon::config::DaemonPaths::resolve(&workspace_root, &warden_core::config::WardenConfig::default())
            .log_path;
        let _log_guard = setup_logging(&log_path);

        tracing::info!(workspace_root = %workspace_root.display(), "starting wardend");

        if let Err(err) = warden_daemon::run(workspace_root, config_path).await {
            tracing::error!(error = %err, "wardend exiting");
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    });
}

enum ArgsOutcome {
    Run { workspace_root: PathBuf, config_path: Option<PathBuf> },
    PrintAndExit(String),
    Error(String),
}

fn parse_args(args: &[String]) -> ArgsOutcome {
    let mut workspace_root: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" | "-V" => return ArgsOutcome::PrintAndExit(format!("wardend {}", env!("CARGO_PKG_VERSION"))),
            "--help" | "-h" => {
                return ArgsOutcome::PrintAndExit(
                    "wardend [--config <path>] [<workspace-root>]\n\n\
                     Runs the orchestrator daemon against <workspace-root> (default: the \
                     current directory), listening on its Unix control socket until asked \
                     to stop.\n\n\
                     OPTIONS:\n    \
                     --config <path>   Load a warden.toml from <path> instead of using defaults\n    \
                     -h, --help        Print help information\n    \
                     -V, --version     Print version information"
                        .to_string(),
                )
            }
            "--config" => match iter.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => return ArgsOutcome::Error("error: --config requires a path argument".to_string()),
            },
            other if other.starts_with('-') => return ArgsOutcome::Error(format!("error: unrecognized flag '{other}'")),
            other => workspace_root = Some(PathBuf::from(other)),
        }
    }

    let workspace_root = workspace_root.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    ArgsOutcome::Run { workspace_root, config_path }
}

fn setup_logging(log_path: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = log_path.parent()?;
    std::fs::create_dir_all(parent).ok()?;
    let file_name = log_path.file_name()?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();
    Some(guard)
}
