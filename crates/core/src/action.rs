// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planner output: one unit of work the executor will perform.

use crate::baseline::BaselineEntry;
use crate::change_event::ChangeEvent;
use crate::conflict::ConflictKind;
use crate::ids::{DriveId, ItemId};
use serde::{Deserialize, Serialize};

/// The resolved `{Remote, Local, Baseline}` triple for a path at plan time.
/// Carried on [`Action`] so the executor never has to re-derive what the
/// planner already observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathView {
    pub local: Option<ChangeEvent>,
    pub remote: Option<ChangeEvent>,
    pub baseline: Option<BaselineEntry>,
}

/// The full action, including whatever data its type needs.
///
/// `ActionTypeKind` (below) is the tag-only projection used by the ledger's
/// `action_type` column and by dispatch sites that only need to branch on
/// the kind, not the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionType {
    FolderCreate,
    LocalMove { old_path: String },
    RemoteMove { old_path: String },
    Download,
    Upload,
    LocalDelete,
    RemoteDelete,
    Conflict { kind: ConflictKind },
    UpdateSynced,
    Cleanup,
}

/// Tag-only projection of [`ActionType`], for the ledger row's
/// `action_type` column and any dispatch site that only needs the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTypeKind {
    FolderCreate,
    LocalMove,
    RemoteMove,
    Download,
    Upload,
    LocalDelete,
    RemoteDelete,
    Conflict,
    UpdateSynced,
    Cleanup,
}

impl From<&ActionType> for ActionTypeKind {
    fn from(t: &ActionType) -> Self {
        match t {
            ActionType::FolderCreate => ActionTypeKind::FolderCreate,
            ActionType::LocalMove { .. } => ActionTypeKind::LocalMove,
            ActionType::RemoteMove { .. } => ActionTypeKind::RemoteMove,
            ActionType::Download => ActionTypeKind::Download,
            ActionType::Upload => ActionTypeKind::Upload,
            ActionType::LocalDelete => ActionTypeKind::LocalDelete,
            ActionType::RemoteDelete => ActionTypeKind::RemoteDelete,
            ActionType::Conflict { .. } => ActionTypeKind::Conflict,
            ActionType::UpdateSynced => ActionTypeKind::UpdateSynced,
            ActionType::Cleanup => ActionTypeKind::Cleanup,
        }
    }
}

impl ActionTypeKind {
    pub fn is_delete(self) -> bool {
        matches!(self, ActionTypeKind::LocalDelete | ActionTypeKind::RemoteDelete)
    }
}

/// One planned unit of work, with its dependency edges (indices into the
/// same plan's action list — resolved to ledger ids once written).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub path: String,
    pub drive_id: DriveId,
    pub item_id: Option<ItemId>,
    pub view: PathView,
    /// Indices into the owning plan's action list that must complete first.
    pub deps: Vec<usize>,
}

impl Action {
    pub fn new(action_type: ActionType, path: impl Into<String>, drive_id: DriveId) -> Self {
        Self {
            action_type,
            path: path.into(),
            drive_id,
            item_id: None,
            view: PathView::default(),
            deps: Vec::new(),
        }
    }

    pub fn kind(&self) -> ActionTypeKind {
        ActionTypeKind::from(&self.action_type)
    }

    /// The path this action's source data comes from: for moves, the
    /// pre-move path; otherwise the action's own path.
    pub fn source_path(&self) -> &str {
        match &self.action_type {
            ActionType::LocalMove { old_path } | ActionType::RemoteMove { old_path } => old_path,
            _ => &self.path,
        }
    }

    /// Bytes this action moves across the wire, for reporting; zero for
    /// actions that only touch metadata (creates, moves, deletes, conflicts).
    pub fn transfer_bytes(&self) -> u64 {
        match self.action_type {
            ActionType::Download => self.view.remote.as_ref().and_then(|c| c.size).unwrap_or(0),
            ActionType::Upload => self.view.local.as_ref().and_then(|c| c.size).unwrap_or(0),
            _ => 0,
        }
    }
}
