// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error kind taxonomy (§6, §7).
//!
//! Each component in `odsync-storage`/`odsync-adapters`/`odsync-engine` owns
//! its own `thiserror` enum for its internal failure modes; this is the
//! small, stable set of *kinds* those enums map onto for the outside world
//! (CLI exit codes, report fields).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, externally visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NosyncGuard,
    SyncRootDeleted,
    DeltaExpired,
    BigDeleteTriggered,
    FilterConfigInvalid,
    Auth,
    Network,
    DiskFull,
    HashMismatch,
    Unknown,
}

impl ErrorKind {
    /// Whether this kind is recovered locally without surfacing to the
    /// caller (§7 "local recovery" tier).
    pub fn is_locally_recoverable(self) -> bool {
        matches!(self, ErrorKind::DeltaExpired)
    }

    /// Whether this kind should end a `run_watch` session outright, as
    /// opposed to being logged and having the batch skipped.
    pub fn ends_watch_session(self) -> bool {
        matches!(self, ErrorKind::SyncRootDeleted)
    }
}

/// A classified error carrying a stable [`ErrorKind`] plus a human-readable
/// detail, suitable for CLI exit-code mapping.
#[derive(Debug, Error)]
#[error("{kind:?}: {detail}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}
