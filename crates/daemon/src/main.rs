// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `odsyncd`: one-drive-per-process sync binary (§4.13). Thin by design —
//! multi-drive orchestration is out of scope (§1) — it parses a config path
//! and a `run-once`/`watch` subcommand, wires the engine to the real HTTP
//! and filesystem adapters, and runs exactly that.

mod lockfile;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use odsync_adapters::local::RealLocalFs;
use odsync_adapters::remote::HttpRemoteApi;
use odsync_core::{DriveId, SystemClock};
use odsync_engine::{Engine, RunOnceOptions, RunSummary, SyncConfig, SyncMode};
use odsync_storage::BaselineStore;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::lockfile::{DaemonLock, LockError};

#[derive(Parser)]
#[command(name = "odsyncd", version, about = "Per-drive cloud storage sync engine")]
struct Cli {
    /// Path to the drive's SyncConfig TOML file.
    #[arg(long, default_value = "odsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run exactly one sync cycle and exit.
    RunOnce {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
        #[arg(long, value_enum, default_value = "bidirectional")]
        mode: ModeArg,
    },
    /// Run an initial cycle, then continuously watch both sides until
    /// interrupted (SIGINT/SIGTERM).
    Watch {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Bidirectional,
    DownloadOnly,
    UploadOnly,
}

impl From<ModeArg> for SyncMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Bidirectional => SyncMode::Bidirectional,
            ModeArg::DownloadOnly => SyncMode::DownloadOnly,
            ModeArg::UploadOnly => SyncMode::UploadOnly,
        }
    }
}

/// Environment variables carrying the bearer token and API base url this
/// process talks to. Credential acquisition (OAuth) is out of scope (§1);
/// the token is handed to this process, not minted by it.
const TOKEN_ENV: &str = "ODSYNC_TOKEN";
const BASE_URL_ENV: &str = "ODSYNC_BASE_URL";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = SyncConfig::load(&cli.config)?;

    let lock = match DaemonLock::acquire(&config.state_dir) {
        Ok(lock) => lock,
        Err(LockError::AlreadyRunning(path)) => {
            let pid = DaemonLock::running_pid(&config.state_dir);
            eprintln!("odsyncd is already running for this state_dir");
            eprintln!("  lock: {}", path.display());
            if let Some(pid) = pid {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let _log_guard = logging::init(&config.state_dir)?;
    info!(drive_id = %config.drive_id, "odsyncd starting");

    let token = std::env::var(TOKEN_ENV)
        .map_err(|_| format!("{TOKEN_ENV} must be set"))?;
    let base_url = std::env::var(BASE_URL_ENV)
        .map_err(|_| format!("{BASE_URL_ENV} must be set"))?;

    let store = std::sync::Arc::new(BaselineStore::open(&config.state_dir)?);
    let remote = HttpRemoteApi::new(base_url, token);
    let drive_id = DriveId::new(config.drive_id.clone());
    let engine = Engine::new(store, remote, RealLocalFs::new(), drive_id, config, SystemClock);

    let result = match cli.command {
        Command::RunOnce { dry_run, force, mode } => {
            let opts = RunOnceOptions { mode: mode.into(), dry_run, force };
            engine.run_once(opts).await
        }
        Command::Watch { dry_run, force } => {
            if dry_run || force {
                info!("--dry-run/--force apply to the initial cycle only; watch mode runs live afterward");
            }
            let opts = RunOnceOptions { mode: SyncMode::Bidirectional, dry_run, force };
            if let Err(e) = engine.run_once(opts).await {
                error!(error = %e, "initial cycle failed, continuing to watch");
            }

            let cancel = CancellationToken::new();
            spawn_signal_forwarder(cancel.clone());
            engine.run_watch(cancel).await
        }
    };

    drop(lock);

    match result {
        Ok(summary) => {
            print_summary(&summary);
            if summary.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "sync cycle failed");
            Err(e.into())
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "succeeded={} failed={} bytes_transferred={} duration={:.2}s dry_run={}",
        summary.succeeded,
        summary.failed,
        summary.bytes_transferred,
        summary.duration.as_secs_f64(),
        summary.dry_run,
    );
    for (kind, count) in &summary.by_action_type {
        println!("  {kind:?}: {count}");
    }
    for diag in &summary.diagnostics {
        println!("  error: {diag}");
    }
}

fn spawn_signal_forwarder(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        cancel.cancel();
    });
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
