// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer output: a single observed change, and the per-path coalesced
//! view the buffer produces from a stream of them.

use crate::baseline::ItemType;
use crate::ids::ItemId;
use serde::{Deserialize, Serialize};

/// Which side of the sync produced a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Local,
    Remote,
}

/// The kind of observed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// A single observed change to one path, produced by the remote or local
/// observer and consumed by the [`PathChanges`] buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub source: Source,
    pub kind: ChangeKind,
    pub path: String,
    pub name: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub mtime_ns: Option<i64>,
    pub is_deleted: bool,
    /// Stable remote identity, when the source can supply one. The delta
    /// stream always sets this; the local observer never does (the
    /// filesystem has no equivalent of its own).
    #[serde(default)]
    pub item_id: Option<ItemId>,
}

impl ChangeEvent {
    pub fn is_create_or_modify(&self) -> bool {
        matches!(self.kind, ChangeKind::Create | ChangeKind::Modify)
    }
}

/// The latest observation from each side for a single path, within one
/// debounce window or scan. `None` means "no observation this cycle", not
/// "unchanged" — the planner consults the baseline for that.
#[derive(Debug, Clone, Default)]
pub struct PathChanges {
    pub path: String,
    pub local: Option<ChangeEvent>,
    pub remote: Option<ChangeEvent>,
}

impl PathChanges {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            local: None,
            remote: None,
        }
    }

    /// Merge a newly observed event into this path's changes. Later events
    /// from the same source overwrite earlier ones (last observation wins) —
    /// this is what makes a safety-scan re-emit of an already-seen state a
    /// no-op rather than a special case.
    pub fn merge(&mut self, event: ChangeEvent) {
        match event.source {
            Source::Local => self.local = Some(event),
            Source::Remote => self.remote = Some(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(source: Source, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            source,
            kind,
            path: "a.txt".into(),
            name: "a.txt".into(),
            item_type: ItemType::File,
            size: Some(10),
            hash: Some("h1".into()),
            mtime_ns: Some(0),
            is_deleted: kind == ChangeKind::Delete,
            item_id: None,
        }
    }

    #[test]
    fn merge_keeps_latest_per_source() {
        let mut changes = PathChanges::new("a.txt");
        changes.merge(ev(Source::Local, ChangeKind::Create));
        assert!(changes.local.is_some());
        assert!(changes.remote.is_none());

        let mut second = ev(Source::Local, ChangeKind::Modify);
        second.hash = Some("h2".into());
        changes.merge(second);
        assert_eq!(changes.local.as_ref().unwrap().hash.as_deref(), Some("h2"));
    }

    #[test]
    fn merge_tracks_both_sides_independently() {
        let mut changes = PathChanges::new("a.txt");
        changes.merge(ev(Source::Local, ChangeKind::Modify));
        changes.merge(ev(Source::Remote, ChangeKind::Modify));
        assert!(changes.local.is_some());
        assert!(changes.remote.is_some());
    }
}
