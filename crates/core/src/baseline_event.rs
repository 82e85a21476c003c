// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log payload for the baseline store.
//!
//! Every mutation the baseline store or action ledger makes is first
//! appended here, then applied to the in-memory `MaterializedBaseline`.
//! Applying an event must be idempotent: replaying the same event twice
//! (as happens if a crash occurs between WAL flush and snapshot) must leave
//! the materialized state unchanged from applying it once. Prefer
//! assignment over increment/accumulate when implementing `apply_event`.

use crate::baseline::ItemType;
use crate::conflict::ConflictRecord;
use crate::ids::{ConflictId, CycleId, DriveId, ItemId, LedgerId};
use crate::ledger::LedgerRow;
use serde::{Deserialize, Serialize};

/// Events that mutate the materialized baseline.
///
/// Serializes with `{"type": "event:name", ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BaselineEvent {
    /// A remote item was observed (create, modify, or a metadata refresh).
    #[serde(rename = "baseline:remote_observed")]
    RemoteObserved {
        drive_id: DriveId,
        path: String,
        item_id: ItemId,
        parent_id: Option<ItemId>,
        name: String,
        item_type: ItemType,
        size: u64,
        hash: Option<String>,
        mtime_ns: i64,
        now_ns: i64,
    },

    /// A local item was observed.
    #[serde(rename = "baseline:local_observed")]
    LocalObserved {
        drive_id: DriveId,
        path: String,
        item_type: ItemType,
        size: u64,
        hash: Option<String>,
        mtime_ns: i64,
        now_ns: i64,
    },

    /// A path was observed deleted on one side.
    #[serde(rename = "baseline:side_deleted")]
    SideDeleted {
        drive_id: DriveId,
        path: String,
        remote: bool,
        now_ns: i64,
    },

    /// An action completed successfully; advance the synced tri-state (and,
    /// for moves, rewrite the path of every descendant).
    #[serde(rename = "baseline:outcome_committed")]
    OutcomeCommitted {
        ledger_id: LedgerId,
        drive_id: DriveId,
        path: String,
        new_path: Option<String>,
        synced_size: u64,
        synced_hash: Option<String>,
        synced_mtime_ns: i64,
        now_ns: i64,
    },

    /// A path's baseline row should be removed (both sides agree it's
    /// gone).
    #[serde(rename = "baseline:entry_removed")]
    EntryRemoved { drive_id: DriveId, path: String },

    /// A drive's delta token advanced. Only ever appended after a cycle
    /// with zero action failures.
    #[serde(rename = "baseline:delta_token_committed")]
    DeltaTokenCommitted { drive_id: DriveId, token: String },

    /// A batch of planned actions was written to the ledger.
    #[serde(rename = "ledger:actions_written")]
    ActionsWritten { cycle_id: CycleId, rows: Vec<LedgerRow> },

    #[serde(rename = "ledger:claimed")]
    LedgerClaimed { id: LedgerId, now_ns: i64 },

    #[serde(rename = "ledger:completed")]
    LedgerCompleted { id: LedgerId },

    #[serde(rename = "ledger:failed")]
    LedgerFailed { id: LedgerId, error_msg: String },

    #[serde(rename = "ledger:canceled")]
    LedgerCanceled { id: LedgerId },

    #[serde(rename = "ledger:reclaimed")]
    LedgerReclaimed { ids: Vec<LedgerId> },

    #[serde(rename = "ledger:session_updated")]
    LedgerSessionUpdated { id: LedgerId, session_url: String },

    #[serde(rename = "ledger:bytes_updated")]
    LedgerBytesUpdated { id: LedgerId, bytes_done: u64 },

    #[serde(rename = "conflict:recorded")]
    ConflictRecorded { record: ConflictRecord },

    #[serde(rename = "conflict:resolved")]
    ConflictResolved { id: ConflictId, resolution: String },

    #[serde(rename = "baseline:tombstone_purged")]
    TombstonePurged { drive_id: DriveId, path: String },
}

impl BaselineEvent {
    /// Short name for tracing/logging, without the payload.
    pub fn name(&self) -> &'static str {
        match self {
            BaselineEvent::RemoteObserved { .. } => "remote_observed",
            BaselineEvent::LocalObserved { .. } => "local_observed",
            BaselineEvent::SideDeleted { .. } => "side_deleted",
            BaselineEvent::OutcomeCommitted { .. } => "outcome_committed",
            BaselineEvent::EntryRemoved { .. } => "entry_removed",
            BaselineEvent::DeltaTokenCommitted { .. } => "delta_token_committed",
            BaselineEvent::ActionsWritten { .. } => "actions_written",
            BaselineEvent::LedgerClaimed { .. } => "ledger_claimed",
            BaselineEvent::LedgerCompleted { .. } => "ledger_completed",
            BaselineEvent::LedgerFailed { .. } => "ledger_failed",
            BaselineEvent::LedgerCanceled { .. } => "ledger_canceled",
            BaselineEvent::LedgerReclaimed { .. } => "ledger_reclaimed",
            BaselineEvent::LedgerSessionUpdated { .. } => "ledger_session_updated",
            BaselineEvent::LedgerBytesUpdated { .. } => "ledger_bytes_updated",
            BaselineEvent::ConflictRecorded { .. } => "conflict_recorded",
            BaselineEvent::ConflictResolved { .. } => "conflict_resolved",
            BaselineEvent::TombstonePurged { .. } => "tombstone_purged",
        }
    }
}
