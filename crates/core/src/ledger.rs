// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable action-queue row. See [`crate::action`] for the in-memory
//! planner output this row is derived from.

use crate::action::{Action, ActionTypeKind};
use crate::ids::{CycleId, DriveId, ItemId, LedgerId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`LedgerRow`].
///
/// `pending -> claimed -> (done | failed)`, or `pending -> canceled`, or
/// `claimed -> pending` (via a stale-claim reclaim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Claimed,
    Done,
    Failed,
    Canceled,
}

impl LedgerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LedgerStatus::Done | LedgerStatus::Failed | LedgerStatus::Canceled)
    }
}

/// A durable row in the action ledger: one planned action plus its
/// execution bookkeeping (claim state, resumable-upload progress, error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub id: LedgerId,
    pub cycle_id: CycleId,
    pub action_type: ActionTypeKind,
    pub path: String,
    pub old_path: Option<String>,
    pub drive_id: DriveId,
    pub item_id: Option<ItemId>,
    pub hash: Option<String>,
    pub size: u64,
    pub session_url: Option<String>,
    pub bytes_done: u64,
    pub depends_on: Vec<LedgerId>,
    pub status: LedgerStatus,
    pub claimed_at_ns: Option<i64>,
    pub error_msg: Option<String>,
}

impl LedgerRow {
    /// Build a pending ledger row from a planned [`Action`].
    ///
    /// `depends_on` must already be resolved to ledger ids by the caller
    /// (the planner only knows same-batch indices).
    pub fn from_action(id: LedgerId, cycle_id: CycleId, action: &Action, depends_on: Vec<LedgerId>) -> Self {
        let old_path = match &action.action_type {
            crate::action::ActionType::LocalMove { old_path }
            | crate::action::ActionType::RemoteMove { old_path } => Some(old_path.clone()),
            _ => None,
        };
        let hash = action
            .view
            .local
            .as_ref()
            .and_then(|e| e.hash.clone())
            .or_else(|| action.view.remote.as_ref().and_then(|e| e.hash.clone()));
        let size = action
            .view
            .local
            .as_ref()
            .and_then(|e| e.size)
            .or_else(|| action.view.remote.as_ref().and_then(|e| e.size))
            .unwrap_or(0);

        Self {
            id,
            cycle_id,
            action_type: action.kind(),
            path: action.path.clone(),
            old_path,
            drive_id: action.drive_id.clone(),
            item_id: action.item_id.clone(),
            hash,
            size,
            session_url: None,
            bytes_done: 0,
            depends_on,
            status: LedgerStatus::Pending,
            claimed_at_ns: None,
            error_msg: None,
        }
    }

    pub fn is_ready(&self, completed: &std::collections::HashSet<LedgerId>) -> bool {
        self.depends_on.iter().all(|d| completed.contains(d))
    }
}
