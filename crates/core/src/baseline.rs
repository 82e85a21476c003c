// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The baseline entry: the authoritative per-path record of "what we last
//! agreed on" between the remote drive and the local filesystem.

use crate::ids::{DriveId, ItemId};
use serde::{Deserialize, Serialize};

/// Kind of filesystem/drive object a [`BaselineEntry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Root,
    File,
    Folder,
}

/// One known path within a drive: server identity, the tri-state of
/// (remote, local, last-synced) observations, and tombstone bookkeeping.
///
/// `synced_*` fields are written only by [`crate::Action`] outcome commit —
/// they are the post-condition of a successfully completed action, never a
/// raw observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub drive_id: DriveId,
    /// NFC-normalized, `/`-separated, relative to the drive's sync root.
    pub path: String,
    pub item_id: ItemId,
    pub parent_drive_id: DriveId,
    pub parent_id: Option<ItemId>,
    pub name: String,
    pub item_type: ItemType,

    pub size: u64,
    pub remote_hash: Option<String>,
    pub remote_mtime_ns: i64,

    pub synced_size: u64,
    pub synced_hash: Option<String>,
    pub synced_mtime_ns: i64,
    pub last_synced_at_ns: i64,

    pub local_size: u64,
    pub local_hash: Option<String>,
    pub local_mtime_ns: i64,

    pub is_deleted: bool,
    pub deleted_at_ns: Option<i64>,

    pub created_at_ns: i64,
    pub updated_at_ns: i64,
}

impl BaselineEntry {
    /// A brand-new entry for a root path, with no remote/local/synced state
    /// observed yet.
    pub fn new_root(drive_id: DriveId, item_id: ItemId, now_ns: i64) -> Self {
        Self {
            drive_id: drive_id.clone(),
            path: String::new(),
            item_id,
            parent_drive_id: drive_id,
            parent_id: None,
            name: String::new(),
            item_type: ItemType::Root,
            size: 0,
            remote_hash: None,
            remote_mtime_ns: 0,
            synced_size: 0,
            synced_hash: None,
            synced_mtime_ns: 0,
            last_synced_at_ns: 0,
            local_size: 0,
            local_hash: None,
            local_mtime_ns: 0,
            is_deleted: false,
            deleted_at_ns: None,
            created_at_ns: now_ns,
            updated_at_ns: now_ns,
        }
    }

    /// Whether the remote side is known to differ from the last-synced
    /// state (by content fingerprint, falling back to size).
    pub fn remote_changed(&self) -> bool {
        match (&self.remote_hash, &self.synced_hash) {
            (Some(r), Some(s)) => r != s,
            (Some(_), None) => true,
            (None, _) => self.size != self.synced_size,
        }
    }

    /// Whether the local side is known to differ from the last-synced
    /// state (by content fingerprint, falling back to size).
    pub fn local_changed(&self) -> bool {
        match (&self.local_hash, &self.synced_hash) {
            (Some(l), Some(s)) => l != s,
            (Some(_), None) => true,
            (None, _) => self.local_size != self.synced_size,
        }
    }

    /// Whether this path has ever been synced (has a non-empty synced
    /// tri-state).
    pub fn has_synced_state(&self) -> bool {
        self.last_synced_at_ns > 0
    }

    /// Marks the entry as a tombstone at the given time.
    pub fn mark_deleted(&mut self, now_ns: i64) {
        self.is_deleted = true;
        self.deleted_at_ns = Some(now_ns);
        self.updated_at_ns = now_ns;
    }

    /// Whether a tombstone is old enough to purge, given a retention window.
    pub fn eligible_for_purge(&self, now_ns: i64, retention_ns: i64) -> bool {
        match self.deleted_at_ns {
            Some(deleted_at) => self.is_deleted && now_ns.saturating_sub(deleted_at) >= retention_ns,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(remote_hash: Option<&str>, local_hash: Option<&str>, synced_hash: Option<&str>) -> BaselineEntry {
        let mut e = BaselineEntry::new_root(DriveId::new("d1"), ItemId::new("i1"), 0);
        e.remote_hash = remote_hash.map(str::to_string);
        e.local_hash = local_hash.map(str::to_string);
        e.synced_hash = synced_hash.map(str::to_string);
        e
    }

    #[test]
    fn remote_changed_detects_hash_divergence() {
        let e = entry(Some("r2"), None, Some("r1"));
        assert!(e.remote_changed());
        let e = entry(Some("r1"), None, Some("r1"));
        assert!(!e.remote_changed());
    }

    #[test]
    fn local_changed_detects_hash_divergence() {
        let e = entry(None, Some("l2"), Some("l1"));
        assert!(e.local_changed());
        let e = entry(None, Some("l1"), Some("l1"));
        assert!(!e.local_changed());
    }

    #[test]
    fn tombstone_purge_respects_retention() {
        let mut e = entry(None, None, None);
        e.mark_deleted(1_000);
        assert!(!e.eligible_for_purge(1_500, 1_000));
        assert!(e.eligible_for_purge(2_000, 1_000));
    }
}
