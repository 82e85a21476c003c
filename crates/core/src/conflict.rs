// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict records: materialized whenever the planner or executor has to
//! choose between a local and a remote edit instead of applying one
//! cleanly.

use crate::ids::{ConflictId, DriveId, ItemId};
use serde::{Deserialize, Serialize};

/// The resolution strategy for a conflict, either chosen automatically by
/// the planner (`KeepBoth`) or supplied by a user command
/// (`ResolveConflict`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    KeepBoth,
    KeepLocal,
    KeepRemote,
}

/// A recorded conflict, pending or resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    pub drive_id: DriveId,
    pub item_id: ItemId,
    pub path: String,
    pub kind: ConflictKind,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub created_at_ns: i64,
}

impl ConflictRecord {
    pub fn new(
        id: ConflictId,
        drive_id: DriveId,
        item_id: ItemId,
        path: impl Into<String>,
        kind: ConflictKind,
        now_ns: i64,
    ) -> Self {
        Self {
            id,
            drive_id,
            item_id,
            path: path.into(),
            kind,
            resolved: false,
            resolution: None,
            created_at_ns: now_ns,
        }
    }

    pub fn resolve(&mut self, resolution: impl Into<String>) {
        self.resolved = true;
        self.resolution = Some(resolution.into());
    }
}
