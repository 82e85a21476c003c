// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The materialized baseline: the in-memory projection built by folding the
//! WAL's [`BaselineEvent`] stream, one event at a time, via [`apply_event`].
//!
//! Folding must be idempotent — replaying the same event twice (as happens
//! on crash recovery between WAL flush and snapshot) must leave the state
//! unchanged from applying it once. Every arm below assigns rather than
//! accumulates for that reason.

use odsync_core::{
    BaselineEntry, BaselineEvent, ConflictId, ConflictRecord, DriveId, ItemId, ItemType, LedgerId,
    LedgerRow, LedgerStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Join a drive id and a sub-key into a flat map key.
///
/// `HashMap` keys must serialize as JSON strings for snapshots, so
/// `(DriveId, _)` composite keys are joined with a separator unlikely to
/// appear in either a drive id or a baseline path, rather than used as
/// tuple keys directly.
fn composite_key(drive_id: &DriveId, sub: &str) -> String {
    format!("{drive_id}\u{1}{sub}")
}

/// The complete materialized state for all drives this daemon knows about.
///
/// Snapshotted wholesale by [`crate::checkpoint`]; rebuilt on startup from
/// the latest snapshot plus any WAL entries written after it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedBaseline {
    items: HashMap<String, BaselineEntry>,
    item_index: HashMap<String, String>,
    delta_tokens: HashMap<DriveId, String>,
    ledger_rows: HashMap<LedgerId, LedgerRow>,
    conflicts: HashMap<ConflictId, ConflictRecord>,
}

impl MaterializedBaseline {
    /// Apply one WAL event, folding it into the current state.
    pub fn apply_event(&mut self, event: &BaselineEvent) {
        match event {
            BaselineEvent::RemoteObserved {
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
            } => {
                let entry =
                    self.entry_or_insert(drive_id.clone(), path.clone(), item_id.clone(), *now_ns);
                entry.item_id = item_id.clone();
                entry.parent_id = parent_id.clone();
                entry.name = name.clone();
                entry.item_type = *item_type;
                entry.size = *size;
                entry.remote_hash = hash.clone();
                entry.remote_mtime_ns = *mtime_ns;
                entry.is_deleted = false;
                entry.deleted_at_ns = None;
                entry.updated_at_ns = *now_ns;
                self.item_index
                    .insert(composite_key(drive_id, item_id.as_str()), path.clone());
            }

            BaselineEvent::LocalObserved {
                drive_id,
                path,
                item_type,
                size,
                hash,
                mtime_ns,
                now_ns,
            } => {
                if let Some(entry) = self.items.get_mut(&composite_key(drive_id, path)) {
                    entry.item_type = *item_type;
                    entry.local_size = *size;
                    entry.local_hash = hash.clone();
                    entry.local_mtime_ns = *mtime_ns;
                    entry.is_deleted = false;
                    entry.deleted_at_ns = None;
                    entry.updated_at_ns = *now_ns;
                }
            }

            BaselineEvent::SideDeleted {
                drive_id,
                path,
                remote: _,
                now_ns,
            } => {
                if let Some(entry) = self.items.get_mut(&composite_key(drive_id, path)) {
                    entry.mark_deleted(*now_ns);
                }
            }

            BaselineEvent::OutcomeCommitted {
                ledger_id: _,
                drive_id,
                path,
                new_path,
                synced_size,
                synced_hash,
                synced_mtime_ns,
                now_ns,
            } => {
                let final_path = new_path.clone().unwrap_or_else(|| path.clone());

                if let Some(new_path) = new_path {
                    self.rewrite_descendants(drive_id, path, new_path);
                }

                if let Some(entry) = self.items.get_mut(&composite_key(drive_id, &final_path)) {
                    entry.synced_size = *synced_size;
                    entry.synced_hash = synced_hash.clone();
                    entry.synced_mtime_ns = *synced_mtime_ns;
                    entry.last_synced_at_ns = *now_ns;
                    entry.updated_at_ns = *now_ns;
                    let item_id = entry.item_id.clone();
                    self.item_index
                        .insert(composite_key(drive_id, item_id.as_str()), final_path);
                }
            }

            BaselineEvent::EntryRemoved { drive_id, path } => {
                if let Some(entry) = self.items.remove(&composite_key(drive_id, path)) {
                    self.item_index
                        .remove(&composite_key(drive_id, entry.item_id.as_str()));
                }
            }

            BaselineEvent::DeltaTokenCommitted { drive_id, token } => {
                self.delta_tokens.insert(drive_id.clone(), token.clone());
            }

            BaselineEvent::ActionsWritten { cycle_id: _, rows } => {
                for row in rows {
                    self.ledger_rows.insert(row.id.clone(), row.clone());
                }
            }

            BaselineEvent::LedgerClaimed { id, now_ns } => {
                if let Some(row) = self.ledger_rows.get_mut(id) {
                    row.status = LedgerStatus::Claimed;
                    row.claimed_at_ns = Some(*now_ns);
                }
            }

            BaselineEvent::LedgerCompleted { id } => {
                if let Some(row) = self.ledger_rows.get_mut(id) {
                    row.status = LedgerStatus::Done;
                }
            }

            BaselineEvent::LedgerFailed { id, error_msg } => {
                if let Some(row) = self.ledger_rows.get_mut(id) {
                    row.status = LedgerStatus::Failed;
                    row.error_msg = Some(error_msg.clone());
                }
            }

            BaselineEvent::LedgerCanceled { id } => {
                if let Some(row) = self.ledger_rows.get_mut(id) {
                    row.status = LedgerStatus::Canceled;
                }
            }

            BaselineEvent::LedgerReclaimed { ids } => {
                for id in ids {
                    if let Some(row) = self.ledger_rows.get_mut(id) {
                        row.status = LedgerStatus::Pending;
                        row.claimed_at_ns = None;
                    }
                }
            }

            BaselineEvent::LedgerSessionUpdated { id, session_url } => {
                if let Some(row) = self.ledger_rows.get_mut(id) {
                    row.session_url = Some(session_url.clone());
                }
            }

            BaselineEvent::LedgerBytesUpdated { id, bytes_done } => {
                if let Some(row) = self.ledger_rows.get_mut(id) {
                    row.bytes_done = *bytes_done;
                }
            }

            BaselineEvent::ConflictRecorded { record } => {
                self.conflicts.insert(record.id.clone(), record.clone());
            }

            BaselineEvent::ConflictResolved { id, resolution } => {
                if let Some(record) = self.conflicts.get_mut(id) {
                    record.resolve(resolution.clone());
                }
            }

            BaselineEvent::TombstonePurged { drive_id, path } => {
                if let Some(entry) = self.items.remove(&composite_key(drive_id, path)) {
                    self.item_index
                        .remove(&composite_key(drive_id, entry.item_id.as_str()));
                }
            }
        }
    }

    fn entry_or_insert(
        &mut self,
        drive_id: DriveId,
        path: String,
        item_id: ItemId,
        now_ns: i64,
    ) -> &mut BaselineEntry {
        let key = composite_key(&drive_id, &path);
        self.items.entry(key).or_insert_with(|| {
            let mut e = BaselineEntry::new_root(drive_id, item_id, now_ns);
            e.path = path;
            e.item_type = ItemType::File;
            e
        })
    }

    /// Rewrite `old_path` and every path nested under it to `new_path`,
    /// preserving each entry's state.
    fn rewrite_descendants(&mut self, drive_id: &DriveId, old_path: &str, new_path: &str) {
        let affected: Vec<String> = self
            .items
            .values()
            .filter(|e| {
                &e.drive_id == drive_id
                    && odsync_core::path_util::rewrite_prefix(&e.path, old_path, new_path).is_some()
            })
            .map(|e| e.path.clone())
            .collect();

        for path in affected {
            if let Some(mut entry) = self.items.remove(&composite_key(drive_id, &path)) {
                let rewritten =
                    odsync_core::path_util::rewrite_prefix(&path, old_path, new_path).unwrap_or(path);
                entry.path = rewritten.clone();
                self.item_index.insert(
                    composite_key(drive_id, entry.item_id.as_str()),
                    rewritten.clone(),
                );
                self.items.insert(composite_key(drive_id, &rewritten), entry);
            }
        }
    }

    pub fn get(&self, drive_id: &DriveId, path: &str) -> Option<&BaselineEntry> {
        self.items.get(&composite_key(drive_id, path))
    }

    pub fn get_by_item_id(&self, drive_id: &DriveId, item_id: &ItemId) -> Option<&BaselineEntry> {
        let path = self.item_index.get(&composite_key(drive_id, item_id.as_str()))?;
        self.get(drive_id, path)
    }

    pub fn entries_for_drive<'a>(
        &'a self,
        drive_id: &'a DriveId,
    ) -> impl Iterator<Item = &'a BaselineEntry> {
        self.items.values().filter(move |e| &e.drive_id == drive_id)
    }

    pub fn delta_token(&self, drive_id: &DriveId) -> Option<&str> {
        self.delta_tokens.get(drive_id).map(String::as_str)
    }

    pub fn ledger_row(&self, id: &LedgerId) -> Option<&LedgerRow> {
        self.ledger_rows.get(id)
    }

    pub fn ledger_rows_for_cycle<'a>(
        &'a self,
        cycle_id: &'a odsync_core::CycleId,
    ) -> impl Iterator<Item = &'a LedgerRow> {
        self.ledger_rows
            .values()
            .filter(move |row| &row.cycle_id == cycle_id)
    }

    pub fn pending_ledger_rows(&self) -> impl Iterator<Item = &LedgerRow> {
        self.ledger_rows
            .values()
            .filter(|row| row.status == LedgerStatus::Pending)
    }

    pub fn stale_claimed_rows(&self, now_ns: i64, stale_after_ns: i64) -> Vec<LedgerId> {
        self.ledger_rows
            .values()
            .filter(|row| {
                row.status == LedgerStatus::Claimed
                    && row
                        .claimed_at_ns
                        .is_some_and(|claimed| now_ns.saturating_sub(claimed) >= stale_after_ns)
            })
            .map(|row| row.id.clone())
            .collect()
    }

    pub fn conflict(&self, id: &ConflictId) -> Option<&ConflictRecord> {
        self.conflicts.get(id)
    }

    pub fn unresolved_conflicts(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.values().filter(|c| !c.resolved)
    }

    pub fn tombstones_eligible_for_purge(
        &self,
        now_ns: i64,
        retention_ns: i64,
    ) -> Vec<(DriveId, String)> {
        self.items
            .values()
            .filter(|e| e.eligible_for_purge(now_ns, retention_ns))
            .map(|e| (e.drive_id.clone(), e.path.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_core::{Action, ActionType, CycleId};

    fn observed(drive: &str, path: &str, item: &str, hash: &str, now_ns: i64) -> BaselineEvent {
        BaselineEvent::RemoteObserved {
            drive_id: DriveId::new(drive),
            path: path.into(),
            item_id: ItemId::new(item),
            parent_id: None,
            name: path.into(),
            item_type: ItemType::File,
            size: 10,
            hash: Some(hash.into()),
            mtime_ns: now_ns,
            now_ns,
        }
    }

    #[test]
    fn remote_observed_creates_entry_and_index() {
        let mut state = MaterializedBaseline::default();
        state.apply_event(&observed("d1", "a.txt", "i1", "h1", 100));

        let drive = DriveId::new("d1");
        let entry = state.get(&drive, "a.txt").unwrap();
        assert_eq!(entry.remote_hash.as_deref(), Some("h1"));
        assert_eq!(
            state.get_by_item_id(&drive, &ItemId::new("i1")).unwrap().path,
            "a.txt"
        );
    }

    #[test]
    fn apply_event_is_idempotent() {
        let mut state = MaterializedBaseline::default();
        let event = observed("d1", "a.txt", "i1", "h1", 100);
        state.apply_event(&event);
        let once = state.clone();
        state.apply_event(&event);
        assert_eq!(
            state.get(&DriveId::new("d1"), "a.txt"),
            once.get(&DriveId::new("d1"), "a.txt")
        );
    }

    #[test]
    fn outcome_committed_rewrites_move_descendants() {
        let mut state = MaterializedBaseline::default();
        state.apply_event(&observed("d1", "folder", "i1", "h1", 100));
        state.apply_event(&observed("d1", "folder/child.txt", "i2", "h2", 100));

        state.apply_event(&BaselineEvent::OutcomeCommitted {
            ledger_id: LedgerId::new("l1"),
            drive_id: DriveId::new("d1"),
            path: "folder".into(),
            new_path: Some("renamed".into()),
            synced_size: 0,
            synced_hash: None,
            synced_mtime_ns: 200,
            now_ns: 200,
        });

        let drive = DriveId::new("d1");
        assert!(state.get(&drive, "folder").is_none());
        assert!(state.get(&drive, "renamed").is_some());
        assert!(state.get(&drive, "renamed/child.txt").is_some());
        assert!(state.get(&drive, "folder/child.txt").is_none());
    }

    #[test]
    fn ledger_lifecycle_transitions() {
        let mut state = MaterializedBaseline::default();
        let action = Action::new(ActionType::Download, "a.txt", DriveId::new("d1"));
        let row = LedgerRow::from_action(LedgerId::new("l1"), CycleId::new("c1"), &action, vec![]);
        state.apply_event(&BaselineEvent::ActionsWritten {
            cycle_id: CycleId::new("c1"),
            rows: vec![row],
        });

        assert_eq!(state.pending_ledger_rows().count(), 1);

        state.apply_event(&BaselineEvent::LedgerClaimed {
            id: LedgerId::new("l1"),
            now_ns: 100,
        });
        assert_eq!(
            state.ledger_row(&LedgerId::new("l1")).unwrap().status,
            LedgerStatus::Claimed
        );

        let stale = state.stale_claimed_rows(1_000, 500);
        assert_eq!(stale, vec![LedgerId::new("l1")]);

        state.apply_event(&BaselineEvent::LedgerCompleted {
            id: LedgerId::new("l1"),
        });
        assert_eq!(
            state.ledger_row(&LedgerId::new("l1")).unwrap().status,
            LedgerStatus::Done
        );
    }

    #[test]
    fn tombstone_purge_removes_entry() {
        let mut state = MaterializedBaseline::default();
        state.apply_event(&observed("d1", "a.txt", "i1", "h1", 100));
        state.apply_event(&BaselineEvent::SideDeleted {
            drive_id: DriveId::new("d1"),
            path: "a.txt".into(),
            remote: true,
            now_ns: 200,
        });

        let drive = DriveId::new("d1");
        assert!(state.get(&drive, "a.txt").unwrap().is_deleted);

        let due = state.tombstones_eligible_for_purge(10_000, 1_000);
        assert_eq!(due, vec![(drive.clone(), "a.txt".to_string())]);

        state.apply_event(&BaselineEvent::TombstonePurged {
            drive_id: drive.clone(),
            path: "a.txt".into(),
        });
        assert!(state.get(&drive, "a.txt").is_none());
    }
}
