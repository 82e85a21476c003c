// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The baseline store: the single writer for all durable sync-engine state.
//!
//! Every mutating operation appends a [`BaselineEvent`] to the WAL, applies
//! it to the in-memory [`MaterializedBaseline`] under a write lock, and
//! returns. Reads take the read lock and never block on I/O. Periodic
//! checkpointing (driven by the engine) snapshots the state and truncates
//! the WAL; see [`crate::checkpoint`].

use crate::checkpoint::{CheckpointError, CheckpointResult, Checkpointer, FsCheckpointWriter};
use crate::snapshot::SnapshotError;
use crate::state::MaterializedBaseline;
use crate::wal::{Wal, WalError};
use odsync_core::{
    BaselineEvent, ConflictId, ConflictRecord, CycleId, DriveId, ItemId, ItemType, LedgerId,
    LedgerRow, LedgerStatus,
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("ledger row {0:?} not found")]
    LedgerRowNotFound(LedgerId),
    #[error("ledger row {0:?} is not pending, cannot claim")]
    NotPending(LedgerId),
}

/// The single writer for baseline and ledger state, backed by a WAL +
/// periodic zstd snapshot.
pub struct BaselineStore {
    wal: Mutex<Wal>,
    state: RwLock<MaterializedBaseline>,
    checkpointer: Checkpointer<FsCheckpointWriter>,
}

impl BaselineStore {
    /// Open (or create) a store rooted at `data_dir`. Replays the WAL on top
    /// of the latest snapshot to recover the in-memory state.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let wal_path = data_dir.join("wal.jsonl");
        let snapshot_path = data_dir.join("snapshot.bin");

        let snapshot = crate::checkpoint::load_snapshot(&snapshot_path)?;
        let (mut state, processed_seq) = match snapshot {
            Some(snap) => (snap.state, snap.seq),
            None => (MaterializedBaseline::default(), 0),
        };

        let mut wal = Wal::open(&wal_path, processed_seq)?;
        let mut replayed = 0u64;
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
            replayed += 1;
        }
        debug!(replayed, "recovered baseline store");

        Ok(Self {
            wal: Mutex::new(wal),
            state: RwLock::new(state),
            checkpointer: Checkpointer::new(snapshot_path),
        })
    }

    /// Acquire a read guard over the current materialized baseline.
    pub fn read(&self) -> RwLockReadGuard<'_, MaterializedBaseline> {
        self.state.read()
    }

    fn apply(&self, event: BaselineEvent) -> Result<u64, StoreError> {
        let seq = self.wal.lock().append(&event)?;
        self.state.write().apply_event(&event);
        Ok(seq)
    }

    /// Flush buffered WAL entries to disk. Called periodically by the
    /// engine's group-commit loop, and always before checkpointing.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.wal.lock().flush().map_err(Into::into)
    }

    pub fn needs_flush(&self) -> bool {
        self.wal.lock().needs_flush()
    }

    // -- baseline observations -------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn observe_remote(
        &self,
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
    ) -> Result<(), StoreError> {
        self.apply(BaselineEvent::RemoteObserved {
            drive_id,
            path,
            item_id,
            parent_id,
            name,
            item_type,
            size,
            hash,
            mtime_ns,
            now_ns,
        })?;
        Ok(())
    }

    pub fn observe_local(
        &self,
        drive_id: DriveId,
        path: String,
        item_type: ItemType,
        size: u64,
        hash: Option<String>,
        mtime_ns: i64,
        now_ns: i64,
    ) -> Result<(), StoreError> {
        self.apply(BaselineEvent::LocalObserved {
            drive_id,
            path,
            item_type,
            size,
            hash,
            mtime_ns,
            now_ns,
        })?;
        Ok(())
    }

    pub fn side_deleted(
        &self,
        drive_id: DriveId,
        path: String,
        remote: bool,
        now_ns: i64,
    ) -> Result<(), StoreError> {
        self.apply(BaselineEvent::SideDeleted {
            drive_id,
            path,
            remote,
            now_ns,
        })?;
        Ok(())
    }

    pub fn remove_entry(&self, drive_id: DriveId, path: String) -> Result<(), StoreError> {
        self.apply(BaselineEvent::EntryRemoved { drive_id, path })?;
        Ok(())
    }

    /// Apply the post-conditions of one completed action: advance the
    /// synced tri-state, rewrite descendant paths for moves, and mark the
    /// ledger row done. Aborts the cycle's token advance on failure (the
    /// caller should not call `commit_delta_token` if this errors).
    #[allow(clippy::too_many_arguments)]
    pub fn commit_outcome(
        &self,
        ledger_id: LedgerId,
        drive_id: DriveId,
        path: String,
        new_path: Option<String>,
        synced_size: u64,
        synced_hash: Option<String>,
        synced_mtime_ns: i64,
        now_ns: i64,
    ) -> Result<(), StoreError> {
        self.apply(BaselineEvent::OutcomeCommitted {
            ledger_id: ledger_id.clone(),
            drive_id,
            path,
            new_path,
            synced_size,
            synced_hash,
            synced_mtime_ns,
            now_ns,
        })?;
        self.apply(BaselineEvent::LedgerCompleted { id: ledger_id })?;
        self.flush()
    }

    /// Replace a drive's saved delta token. Call only after every action in
    /// the cycle is terminal with zero failures.
    pub fn commit_delta_token(&self, drive_id: DriveId, token: String) -> Result<(), StoreError> {
        self.apply(BaselineEvent::DeltaTokenCommitted { drive_id, token })?;
        self.flush()
    }

    /// Purge tombstones older than `retention_ns`. Non-fatal by design: the
    /// caller should log and continue on error rather than abort a cycle.
    pub fn sweep_tombstones(&self, now_ns: i64, retention_ns: i64) -> Result<usize, StoreError> {
        let due = self.read().tombstones_eligible_for_purge(now_ns, retention_ns);
        let count = due.len();
        for (drive_id, path) in due {
            self.apply(BaselineEvent::TombstonePurged { drive_id, path })?;
        }
        Ok(count)
    }

    // -- action ledger ----------------------------------------------------

    /// Insert a batch of planned actions atomically. `rows` must already
    /// have their `depends_on` resolved to ledger ids by the caller.
    pub fn write_actions(
        &self,
        cycle_id: CycleId,
        rows: Vec<LedgerRow>,
    ) -> Result<Vec<LedgerId>, StoreError> {
        let ids: Vec<LedgerId> = rows.iter().map(|r| r.id.clone()).collect();
        self.apply(BaselineEvent::ActionsWritten { cycle_id, rows })?;
        self.flush()?;
        Ok(ids)
    }

    pub fn load_pending(&self, cycle_id: &CycleId) -> Vec<LedgerRow> {
        self.read()
            .ledger_rows_for_cycle(cycle_id)
            .filter(|r| matches!(r.status, LedgerStatus::Pending | LedgerStatus::Claimed))
            .cloned()
            .collect()
    }

    pub fn load_all_pending(&self) -> Vec<LedgerRow> {
        self.read()
            .pending_ledger_rows()
            .cloned()
            .collect()
    }

    /// Atomic `pending -> claimed`. Fails if the row isn't pending, which
    /// enforces at-most-one executor per action.
    pub fn claim(&self, id: LedgerId, now_ns: i64) -> Result<(), StoreError> {
        let status = self
            .read()
            .ledger_row(&id)
            .map(|r| r.status)
            .ok_or_else(|| StoreError::LedgerRowNotFound(id.clone()))?;
        if status != LedgerStatus::Pending {
            return Err(StoreError::NotPending(id));
        }
        self.apply(BaselineEvent::LedgerClaimed { id, now_ns })?;
        Ok(())
    }

    pub fn complete(&self, id: LedgerId) -> Result<(), StoreError> {
        if self.is_terminal(&id) {
            return Ok(());
        }
        self.apply(BaselineEvent::LedgerCompleted { id })?;
        Ok(())
    }

    pub fn fail(&self, id: LedgerId, error_msg: String) -> Result<(), StoreError> {
        if self.is_terminal(&id) {
            return Ok(());
        }
        self.apply(BaselineEvent::LedgerFailed { id, error_msg })?;
        Ok(())
    }

    pub fn cancel(&self, id: LedgerId) -> Result<(), StoreError> {
        if self.is_terminal(&id) {
            return Ok(());
        }
        self.apply(BaselineEvent::LedgerCanceled { id })?;
        Ok(())
    }

    fn is_terminal(&self, id: &LedgerId) -> bool {
        self.read()
            .ledger_row(id)
            .map(|r| r.status.is_terminal())
            .unwrap_or(true)
    }

    /// `claimed -> pending` for rows whose claim is older than `older_than_ns`.
    /// Lets the next startup recover from a crashed executor.
    pub fn reclaim_stale(&self, now_ns: i64, older_than_ns: i64) -> Result<usize, StoreError> {
        let stale = self.read().stale_claimed_rows(now_ns, older_than_ns);
        let count = stale.len();
        if !stale.is_empty() {
            warn!(count, "reclaiming stale ledger claims");
            self.apply(BaselineEvent::LedgerReclaimed { ids: stale })?;
        }
        Ok(count)
    }

    pub fn update_session_url(&self, id: LedgerId, session_url: String) -> Result<(), StoreError> {
        self.apply(BaselineEvent::LedgerSessionUpdated { id, session_url })?;
        Ok(())
    }

    pub fn update_bytes_done(&self, id: LedgerId, bytes_done: u64) -> Result<(), StoreError> {
        self.apply(BaselineEvent::LedgerBytesUpdated { id, bytes_done })?;
        Ok(())
    }

    // -- conflicts ---------------------------------------------------------

    pub fn record_conflict(&self, record: ConflictRecord) -> Result<(), StoreError> {
        self.apply(BaselineEvent::ConflictRecorded { record })?;
        self.flush()
    }

    pub fn resolve_conflict(&self, id: ConflictId, resolution: String) -> Result<(), StoreError> {
        self.apply(BaselineEvent::ConflictResolved { id, resolution })?;
        self.flush()
    }

    pub fn unresolved_conflicts(&self) -> Vec<ConflictRecord> {
        self.read().unresolved_conflicts().cloned().collect()
    }

    // -- checkpointing -------------------------------------------------------

    /// Serialize and durably persist the current state, then truncate the
    /// WAL up to the checkpointed sequence. Blocking; intended for periodic
    /// background invocation and for a clean shutdown.
    pub fn checkpoint(&self) -> Result<CheckpointResult, StoreError> {
        self.flush()?;
        let seq = self.wal.lock().write_seq();
        let state_clone = self.state.read().clone();
        let result = self.checkpointer.checkpoint_sync(seq, &state_clone)?;
        let mut wal = self.wal.lock();
        wal.mark_processed(seq);
        wal.truncate_before(seq + 1)?;
        Ok(result)
    }
}
