// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the sync engine.

use odsync_adapters::{LocalFsError, RemoteError};
use odsync_core::ErrorKind;
use odsync_storage::StoreError;
use thiserror::Error;

/// Top-level engine error. Each component owns its own error enum; this
/// wraps them with `#[from]` and exposes a stable [`ErrorKind`] for the CLI
/// to map onto an exit code, matching the teacher's `RuntimeError`/
/// `ExecuteError` layering.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("local filesystem error: {0}")]
    LocalFs(#[from] LocalFsError),
    #[error("{0}")]
    Core(#[from] odsync_core::CoreError),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("fs watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("worker task panicked: {0}")]
    WorkerPanic(String),
}

impl EngineError {
    /// Project this error onto the stable, externally visible kind taxonomy
    /// (§6, §7) used for CLI exit codes and report fields.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Store(_) => ErrorKind::Unknown,
            EngineError::Remote(RemoteError::Auth(_)) => ErrorKind::Auth,
            EngineError::Remote(RemoteError::Network(_)) => ErrorKind::Network,
            EngineError::Remote(RemoteError::DeltaExpired) => ErrorKind::DeltaExpired,
            EngineError::Remote(_) => ErrorKind::Unknown,
            EngineError::LocalFs(LocalFsError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::Other
                    && source.raw_os_error() == Some(28) =>
            {
                ErrorKind::DiskFull
            }
            EngineError::LocalFs(_) => ErrorKind::Unknown,
            EngineError::Core(e) => e.kind,
            EngineError::Config(_) => ErrorKind::FilterConfigInvalid,
            EngineError::Watch(_) => ErrorKind::Unknown,
            EngineError::WorkerPanic(_) => ErrorKind::Unknown,
        }
    }
}

/// Convenience constructor for the `CoreError`-backed kinds the engine
/// raises directly (`nosync_guard`, `sync_root_deleted`, `big_delete_triggered`).
pub fn core_err(kind: ErrorKind, detail: impl Into<String>) -> EngineError {
    EngineError::Core(odsync_core::CoreError::new(kind, detail))
}
