// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local filesystem observer (§4.4): a recursive full scan plus a live
//! watcher backed by a periodic safety scan, translating on-disk state into
//! [`ChangeEvent`]s relative to the baseline. Built on
//! [`odsync_adapters::watch::FsWatcher`] the way the remote observer is
//! built on [`odsync_adapters::remote::RemoteApi`]; per-path coalescing
//! reuses [`crate::buffer::EventBuffer`].

use crate::buffer::EventBuffer;
use crate::error::{core_err, EngineError};
use odsync_adapters::local::{FsStat, LocalFs};
use odsync_adapters::watch::{FsWatcher, RawFsEvent, RawFsEventKind};
use odsync_core::{path_util, BaselineEntry, ChangeEvent, ChangeKind, Clock, DriveId, ErrorKind, ItemType, Source};
use odsync_storage::BaselineStore;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Presence of this file anywhere under the sync root disables syncing for
/// the whole drive until removed (§4.4).
const NOSYNC_MARKER: &str = ".nosync";

/// Names never walked regardless of `ignore_marker` configuration.
const ALWAYS_EXCLUDED: &[&str] = &[".git", ".odsync-trash", ".DS_Store"];

/// Rejects names `notify`/most filesystems would accept but that cannot
/// round-trip through the baseline's path encoding or a second OS.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('\0')
        && name != "."
        && name != ".."
        && !name.ends_with(' ')
        && !name.ends_with('.')
}

fn change_event(source: Source, kind: ChangeKind, path: &str, item_type: ItemType, stat: Option<FsStat>, hash: Option<String>) -> ChangeEvent {
    ChangeEvent {
        source,
        kind,
        path: path.to_string(),
        name: path_util::leaf_name(path).to_string(),
        item_type,
        size: stat.map(|s| s.size),
        hash,
        mtime_ns: stat.map(|s| s.mtime_ns),
        is_deleted: kind == ChangeKind::Delete,
        item_id: None,
    }
}

/// Observes one drive's local filesystem subtree.
#[derive(Clone)]
pub struct LocalObserver<F, C> {
    local: F,
    store: Arc<BaselineStore>,
    sync_root: PathBuf,
    drive_id: DriveId,
    ignore_marker: String,
    clock: C,
}

impl<F: LocalFs, C: Clock> LocalObserver<F, C> {
    pub fn new(
        local: F,
        store: Arc<BaselineStore>,
        sync_root: PathBuf,
        drive_id: DriveId,
        ignore_marker: String,
        clock: C,
    ) -> Self {
        Self { local, store, sync_root, drive_id, ignore_marker, clock }
    }

    fn fs_path(&self, rel: &str) -> PathBuf {
        path_util::to_fs_path(&self.sync_root, rel)
    }

    async fn nosync_guard(&self) -> Result<(), EngineError> {
        if self.local.stat(&self.sync_root.join(NOSYNC_MARKER)).await?.is_some() {
            return Err(core_err(
                ErrorKind::NosyncGuard,
                format!("{NOSYNC_MARKER} present under sync root, refusing to scan"),
            ));
        }
        Ok(())
    }

    /// Whether `rel` has ever carried a local observation, so a full scan
    /// that no longer finds it on disk should emit a delete rather than
    /// silently ignore a path the local side never knew about.
    fn previously_observed_locally(entry: &BaselineEntry) -> bool {
        entry.local_hash.is_some() || entry.local_mtime_ns != 0
    }

    /// Recursively walks `rel` (directory, `""` for the sync root), pushing
    /// one event per changed or brand-new path into `events` and recording
    /// every visited path in `seen` so the caller can diff deletions
    /// afterward.
    async fn scan_dir(&self, rel: &str, seen: &mut HashSet<String>, events: &mut Vec<ChangeEvent>) -> Result<(), EngineError> {
        if !self.ignore_marker.is_empty() {
            let marker_path = self.fs_path(rel).join(&self.ignore_marker);
            if self.local.stat(&marker_path).await?.is_some() {
                return Ok(());
            }
        }

        let entries = self.local.read_dir(&self.fs_path(rel)).await?;
        for entry in entries {
            if ALWAYS_EXCLUDED.contains(&entry.name.as_str()) || !is_valid_name(&entry.name) {
                continue;
            }
            let child_path = if rel.is_empty() {
                entry.name.clone()
            } else {
                format!("{rel}/{}", entry.name)
            };

            if entry.is_dir {
                seen.insert(child_path.clone());
                let baseline = self.store.read().get(&self.drive_id, &child_path).cloned();
                if baseline.as_ref().map(BaselineEntry::local_changed).unwrap_or(true)
                    || baseline.is_none()
                {
                    events.push(change_event(Source::Local, ChangeKind::Create, &child_path, ItemType::Folder, None, None));
                }
                Box::pin(self.scan_dir(&child_path, seen, events)).await?;
                continue;
            }

            seen.insert(child_path.clone());
            let stat = match self.local.stat(&entry.path).await? {
                Some(stat) => stat,
                None => continue, // removed between read_dir and stat
            };
            let hash = self.local.hash_file(&entry.path).await?;
            let baseline = self.store.read().get(&self.drive_id, &child_path).cloned();

            let unchanged = baseline
                .as_ref()
                .is_some_and(|b| b.local_hash.as_deref() == Some(hash.as_str()) && b.local_size == stat.size);
            if unchanged {
                continue;
            }

            let kind = if baseline.is_some() { ChangeKind::Modify } else { ChangeKind::Create };
            events.push(change_event(Source::Local, kind, &child_path, ItemType::File, Some(stat), Some(hash)));
        }

        Ok(())
    }

    /// Full recursive scan relative to the baseline (§4.4 `FullScan`).
    pub async fn full_scan(&self) -> Result<Vec<ChangeEvent>, EngineError> {
        self.nosync_guard().await?;

        let mut seen = HashSet::new();
        let mut events = Vec::new();
        self.scan_dir("", &mut seen, &mut events).await?;

        let baseline = self.store.read();
        for entry in baseline.entries_for_drive(&self.drive_id) {
            if entry.item_type == ItemType::Root || entry.is_deleted || seen.contains(&entry.path) {
                continue;
            }
            if !Self::previously_observed_locally(entry) {
                continue;
            }
            events.push(change_event(Source::Local, ChangeKind::Delete, &entry.path, entry.item_type, None, None));
        }

        Ok(events)
    }

    /// Stat + hash one path freshly observed by the live watcher, producing
    /// a create/modify event, or `None` if the path vanished again before it
    /// could be inspected (the watcher's own delete event will cover it).
    async fn observe_path(&self, rel: &str) -> Result<Option<ChangeEvent>, EngineError> {
        let fs_path = self.fs_path(rel);
        let Some(stat) = self.local.stat(&fs_path).await? else {
            return Ok(None);
        };
        let baseline = self.store.read().get(&self.drive_id, rel).cloned();

        if stat.is_dir {
            let kind = if baseline.is_some() { ChangeKind::Modify } else { ChangeKind::Create };
            return Ok(Some(change_event(Source::Local, kind, rel, ItemType::Folder, Some(stat), None)));
        }

        let hash = self.local.hash_file(&fs_path).await?;
        if baseline
            .as_ref()
            .is_some_and(|b| b.local_hash.as_deref() == Some(hash.as_str()) && b.local_size == stat.size)
        {
            return Ok(None); // chmod-only or spurious notify wakeup
        }
        let kind = if baseline.is_some() { ChangeKind::Modify } else { ChangeKind::Create };
        Ok(Some(change_event(Source::Local, kind, rel, ItemType::File, Some(stat), Some(hash))))
    }

    fn delete_event(&self, rel: &str) -> ChangeEvent {
        let item_type = self
            .store
            .read()
            .get(&self.drive_id, rel)
            .map(|e| e.item_type)
            .unwrap_or(ItemType::File);
        change_event(Source::Local, ChangeKind::Delete, rel, item_type, None, None)
    }

    /// Translate one raw watcher event into zero or more buffered changes.
    async fn handle_raw_event(&self, raw: RawFsEvent, buffer: &EventBuffer) -> Result<(), EngineError> {
        for path in &raw.paths {
            let Some(rel) = path_util::from_fs_path(&self.sync_root, path) else {
                continue;
            };
            if rel.is_empty() {
                continue;
            }
            let leaf = path_util::leaf_name(&rel);
            if ALWAYS_EXCLUDED.contains(&leaf) || !is_valid_name(leaf) {
                continue;
            }

            match raw.kind {
                RawFsEventKind::Remove => buffer.add(self.delete_event(&rel)),
                RawFsEventKind::Create => {
                    let Some(event) = self.observe_path(&rel).await? else { continue };
                    let is_dir = matches!(event.item_type, ItemType::Folder);
                    buffer.add(event);
                    if is_dir {
                        // A directory moved into the sync root can arrive
                        // with files already inside it, before a watch on
                        // the new subtree is installed - walk it now rather
                        // than waiting for the next periodic safety scan.
                        let mut seen = HashSet::new();
                        let mut events = Vec::new();
                        self.scan_dir(&rel, &mut seen, &mut events).await?;
                        for event in events {
                            buffer.add(event);
                        }
                    }
                }
                RawFsEventKind::Modify | RawFsEventKind::Rename => {
                    if let Some(event) = self.observe_path(&rel).await? {
                        buffer.add(event);
                    }
                }
                RawFsEventKind::Other => {}
            }
        }
        Ok(())
    }

    /// Installs a live watcher plus a periodic safety scan, forwarding
    /// debounced batches on `tx` until `cancel` fires (§4.4 `Watch`).
    /// Watcher install failures back off exponentially, re-checking that
    /// `sync_root` still exists on each attempt and on every safety tick.
    pub async fn watch(
        &self,
        tx: mpsc::Sender<Vec<ChangeEvent>>,
        debounce: Duration,
        coalesce_cooldown: Duration,
        safety_interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        self.nosync_guard().await?;

        let buffer = Arc::new(EventBuffer::new());
        let (flush_tx, mut flush_rx) = mpsc::channel(16);
        let flusher = tokio::spawn(crate::buffer::run_debounced_flusher(
            buffer.clone(),
            debounce,
            coalesce_cooldown,
            flush_tx,
            cancel.clone(),
        ));

        let forward = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        batch = flush_rx.recv() => {
                            let Some(batch) = batch else { return };
                            let events: Vec<ChangeEvent> = batch.into_iter().flat_map(|p| {
                                let mut out = Vec::new();
                                if let Some(e) = p.local { out.push(e); }
                                out
                            }).collect();
                            if !events.is_empty() && tx.send(events).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            })
        };

        let mut backoff = Duration::from_millis(500);
        let mut watcher_slot: Option<FsWatcher> = None;
        let (raw_tx, mut raw_rx) = mpsc::channel::<RawFsEvent>(1024);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if watcher_slot.is_none() {
                if self.local.stat(&self.sync_root).await?.is_none() {
                    return Err(core_err(ErrorKind::SyncRootDeleted, "sync root no longer exists"));
                }
                match FsWatcher::watch(&self.sync_root, raw_tx.clone()) {
                    Ok(w) => {
                        watcher_slot = Some(w);
                        backoff = Duration::from_millis(500);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "local watcher install failed, backing off");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(Duration::from_secs(60));
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                raw = raw_rx.recv() => {
                    match raw {
                        Some(raw) => {
                            if let Err(e) = self.handle_raw_event(raw, &buffer).await {
                                tracing::warn!(error = %e, "failed to translate local fs event");
                            }
                        }
                        None => { watcher_slot = None; }
                    }
                }
                _ = tokio::time::sleep(safety_interval) => {
                    if self.local.stat(&self.sync_root).await?.is_none() {
                        return Err(core_err(ErrorKind::SyncRootDeleted, "sync root no longer exists"));
                    }
                    match self.full_scan().await {
                        Ok(events) => for e in events { buffer.add(e); },
                        Err(e) => tracing::warn!(error = %e, "safety scan failed"),
                    }
                }
            }
        }

        drop(watcher_slot);
        flusher.abort();
        forward.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_adapters::local::RealLocalFs;
    use odsync_core::FakeClock;
    use tempfile::tempdir;

    fn store(dir: &Path) -> Arc<BaselineStore> {
        Arc::new(BaselineStore::open(dir).unwrap())
    }

    fn observer(sync_root: &Path, store: Arc<BaselineStore>) -> LocalObserver<RealLocalFs, FakeClock> {
        LocalObserver::new(
            RealLocalFs::new(),
            store,
            sync_root.to_path_buf(),
            DriveId::new("d1"),
            ".odignore".to_string(),
            FakeClock::default(),
        )
    }

    #[tokio::test]
    async fn full_scan_reports_new_file_as_create() {
        let root = tempdir().unwrap();
        let state_dir = tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), b"hello").unwrap();

        let obs = observer(root.path(), store(state_dir.path()));
        let events = obs.full_scan().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Create);
        assert_eq!(events[0].path, "a.txt");
    }

    #[tokio::test]
    async fn full_scan_skips_directory_with_ignore_marker() {
        let root = tempdir().unwrap();
        let state_dir = tempdir().unwrap();
        std::fs::create_dir(root.path().join("skip")).unwrap();
        std::fs::write(root.path().join("skip").join(".odignore"), b"").unwrap();
        std::fs::write(root.path().join("skip").join("hidden.txt"), b"x").unwrap();

        let obs = observer(root.path(), store(state_dir.path()));
        let events = obs.full_scan().await.unwrap();
        assert!(events.iter().all(|e| e.path != "skip/hidden.txt"));
    }

    #[tokio::test]
    async fn full_scan_errors_on_nosync_marker() {
        let root = tempdir().unwrap();
        let state_dir = tempdir().unwrap();
        std::fs::write(root.path().join(NOSYNC_MARKER), b"").unwrap();

        let obs = observer(root.path(), store(state_dir.path()));
        let err = obs.full_scan().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NosyncGuard);
    }

    #[tokio::test]
    async fn full_scan_reports_delete_for_vanished_baseline_entry() {
        let root = tempdir().unwrap();
        let state_dir = tempdir().unwrap();
        let baseline = store(state_dir.path());
        baseline
            .observe_local(DriveId::new("d1"), "gone.txt".into(), ItemType::File, 5, Some("h1".into()), 100, 100)
            .unwrap();

        let obs = observer(root.path(), baseline);
        let events = obs.full_scan().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Delete);
        assert_eq!(events[0].path, "gone.txt");
    }

    #[tokio::test]
    async fn full_scan_skips_unchanged_file() {
        let root = tempdir().unwrap();
        let state_dir = tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), b"hello").unwrap();
        let hash = odsync_adapters::hash::sha256_hex(b"hello");

        let baseline = store(state_dir.path());
        baseline
            .observe_local(DriveId::new("d1"), "a.txt".into(), ItemType::File, 5, Some(hash), 0, 100)
            .unwrap();

        let obs = observer(root.path(), baseline);
        let events = obs.full_scan().await.unwrap();
        assert!(events.is_empty());
    }
}
