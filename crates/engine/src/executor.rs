// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-action-type dispatch (§4.9): the single place that turns a planned
//! [`Action`] into remote API calls, local filesystem effects, and the
//! baseline-store commit that advances the synced tri-state. Generalizes
//! the teacher's `Executor` single-dispatch-point pattern — one `tracing`
//! span per action, `RemoteApi`/`LocalFs` as the two capability seams — to
//! the ten action kinds this planner produces instead of the teacher's
//! step-runner effects.

use crate::error::{core_err, EngineError};
use crate::pool::ActionRunner;
use async_trait::async_trait;
use odsync_adapters::local::LocalFs;
use odsync_adapters::remote::RemoteApi;
use odsync_core::{
    path_util, Action, ActionType, Clock, ConflictId, ConflictKind, ConflictRecord, DriveId,
    ErrorKind, ItemId, ItemType, LedgerId,
};
use odsync_storage::BaselineStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Single-request uploads below this size; resumable session above it.
const RESUMABLE_UPLOAD_THRESHOLD: u64 = 4 * 1024 * 1024;
const UPLOAD_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Executes one planned action against the real remote/local adapters and
/// commits its outcome to the baseline store.
pub struct Executor<R, F, C> {
    remote: R,
    local: F,
    store: Arc<BaselineStore>,
    sync_root: PathBuf,
    clock: C,
    max_file_size: u64,
    use_local_trash: bool,
}

impl<R: RemoteApi, F: LocalFs, C: Clock> Executor<R, F, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        remote: R,
        local: F,
        store: Arc<BaselineStore>,
        sync_root: PathBuf,
        clock: C,
        max_file_size: u64,
        use_local_trash: bool,
    ) -> Self {
        Self {
            remote,
            local,
            store,
            sync_root,
            clock,
            max_file_size,
            use_local_trash,
        }
    }

    fn parent_item_id(&self, drive_id: &DriveId, path: &str) -> Option<ItemId> {
        let parent = path_util::parent_path(path);
        if parent.is_empty() {
            return None;
        }
        self.store.read().get(drive_id, parent).map(|e| e.item_id.clone())
    }

    async fn download(&self, ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        let item_id = action
            .item_id
            .clone()
            .ok_or_else(|| core_err(ErrorKind::Unknown, format!("{}: download missing item id", action.path)))?;
        let remote = action.view.remote.as_ref();
        let expected_hash = remote.and_then(|e| e.hash.clone());
        let expected_size = remote.and_then(|e| e.size);
        let mtime_ns = remote.and_then(|e| e.mtime_ns).unwrap_or_else(|| self.clock.now_ns());

        let bytes = self.remote.download(&item_id).await?;
        if bytes.len() as u64 > self.max_file_size {
            return Err(core_err(
                ErrorKind::Unknown,
                format!("{} ({} bytes) exceeds max_file_size", action.path, bytes.len()),
            ));
        }

        let fs_path = path_util::to_fs_path(&self.sync_root, &action.path);
        if let Some(parent) = fs_path.parent() {
            self.local.create_dir_all(parent).await?;
        }
        self.local.write_atomic(&fs_path, &bytes, Some(mtime_ns)).await?;

        let actual_hash = self.local.hash_file(&fs_path).await?;
        if let Some(expected) = &expected_hash {
            if expected != &actual_hash {
                return Err(core_err(
                    ErrorKind::HashMismatch,
                    format!("fingerprint mismatch downloading {}", action.path),
                ));
            }
        }

        let now_ns = self.clock.now_ns();
        let size = expected_size.unwrap_or(bytes.len() as u64);
        // Download is often the first time this path's remote identity is
        // recorded (no prior Upload/FolderCreate ever called observe_remote
        // for it), so establish the baseline row here too - otherwise
        // commit_outcome below has nothing to attach the synced state to.
        self.store.observe_remote(
            action.drive_id.clone(),
            action.path.clone(),
            item_id,
            self.parent_item_id(&action.drive_id, &action.path),
            remote.map(|e| e.name.clone()).unwrap_or_else(|| path_util::leaf_name(&action.path).to_string()),
            remote.map(|e| e.item_type).unwrap_or(ItemType::File),
            size,
            expected_hash,
            mtime_ns,
            now_ns,
        )?;
        self.store.commit_outcome(
            ledger_id.clone(),
            action.drive_id.clone(),
            action.path.clone(),
            None,
            size,
            Some(actual_hash),
            mtime_ns,
            now_ns,
        )?;
        Ok(())
    }

    async fn upload(&self, ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        let fs_path = path_util::to_fs_path(&self.sync_root, &action.path);
        let bytes = self.local.read(&fs_path).await?;
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(core_err(
                ErrorKind::Unknown,
                format!("{} ({size} bytes) exceeds max_file_size", action.path),
            ));
        }
        let local_hash = self.local.hash_file(&fs_path).await?;
        let parent_id = self.parent_item_id(&action.drive_id, &action.path);
        let name = path_util::leaf_name(&action.path).to_string();

        let item = if size <= RESUMABLE_UPLOAD_THRESHOLD {
            self.remote.upload_simple(parent_id.as_ref(), &name, bytes).await?
        } else {
            let session_url = self.remote.create_session(parent_id.as_ref(), &name, size).await?;
            self.store.update_session_url(ledger_id.clone(), session_url.clone())?;

            let mut offset = 0u64;
            let mut finished = None;
            for chunk in bytes.chunks(UPLOAD_CHUNK_SIZE) {
                finished = self.remote.upload_chunk(&session_url, offset, chunk, size).await?;
                offset += chunk.len() as u64;
                self.store.update_bytes_done(ledger_id.clone(), offset)?;
            }
            finished.ok_or_else(|| {
                core_err(ErrorKind::Unknown, format!("upload session for {} never completed", action.path))
            })?
        };

        if let Some(remote_hash) = &item.hash {
            if remote_hash != &local_hash {
                return Err(core_err(
                    ErrorKind::HashMismatch,
                    format!("fingerprint mismatch uploading {}", action.path),
                ));
            }
        }

        let now_ns = self.clock.now_ns();
        let stat = self
            .local
            .stat(&fs_path)
            .await?
            .ok_or_else(|| core_err(ErrorKind::Unknown, format!("{} vanished mid-upload", action.path)))?;

        self.store.observe_remote(
            action.drive_id.clone(),
            action.path.clone(),
            item.item_id.clone(),
            item.parent_id.clone(),
            item.name.clone(),
            item.item_type,
            item.size,
            item.hash.clone(),
            item.mtime_ns,
            now_ns,
        )?;
        self.store.commit_outcome(
            ledger_id.clone(),
            action.drive_id.clone(),
            action.path.clone(),
            None,
            stat.size,
            Some(local_hash),
            stat.mtime_ns,
            now_ns,
        )?;
        Ok(())
    }

    async fn create_folder(&self, ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        let fs_path = path_util::to_fs_path(&self.sync_root, &action.path);
        let now_ns = self.clock.now_ns();

        let mtime_ns = if let Some(remote) = action.view.remote.as_ref() {
            // Remote-driven: the folder already exists server-side, mirror it locally.
            self.local.create_dir_all(&fs_path).await?;
            let item_id = remote
                .item_id
                .clone()
                .or_else(|| action.item_id.clone())
                .ok_or_else(|| core_err(ErrorKind::Unknown, format!("{}: folder create missing item id", action.path)))?;
            self.store.observe_remote(
                action.drive_id.clone(),
                action.path.clone(),
                item_id,
                self.parent_item_id(&action.drive_id, &action.path),
                remote.name.clone(),
                ItemType::Folder,
                0,
                None,
                remote.mtime_ns.unwrap_or(now_ns),
                now_ns,
            )?;
            remote.mtime_ns.unwrap_or(now_ns)
        } else {
            let parent_id = self.parent_item_id(&action.drive_id, &action.path);
            let name = path_util::leaf_name(&action.path).to_string();
            let item = self.remote.create_folder(parent_id.as_ref(), &name).await?;
            self.store.observe_remote(
                action.drive_id.clone(),
                action.path.clone(),
                item.item_id,
                item.parent_id,
                item.name,
                ItemType::Folder,
                0,
                None,
                now_ns,
                now_ns,
            )?;
            now_ns
        };

        self.store.commit_outcome(
            ledger_id.clone(),
            action.drive_id.clone(),
            action.path.clone(),
            None,
            0,
            None,
            mtime_ns,
            now_ns,
        )?;
        Ok(())
    }

    /// Renames the local file to mirror a remote-originated move.
    async fn local_move(&self, ledger_id: &LedgerId, action: &Action, old_path: &str) -> Result<(), EngineError> {
        let from = path_util::to_fs_path(&self.sync_root, old_path);
        let to = path_util::to_fs_path(&self.sync_root, &action.path);
        if let Some(parent) = to.parent() {
            self.local.create_dir_all(parent).await?;
        }
        self.local.rename(&from, &to).await?;

        let now_ns = self.clock.now_ns();
        let remote = action.view.remote.as_ref();
        let size = remote.and_then(|e| e.size).unwrap_or(0);
        let hash = remote.and_then(|e| e.hash.clone());
        let mtime_ns = remote.and_then(|e| e.mtime_ns).unwrap_or(now_ns);

        self.store.commit_outcome(
            ledger_id.clone(),
            action.drive_id.clone(),
            old_path.to_string(),
            Some(action.path.clone()),
            size,
            hash,
            mtime_ns,
            now_ns,
        )?;
        Ok(())
    }

    /// PATCHes the remote item's parent/name to mirror a local-originated move.
    async fn remote_move(&self, ledger_id: &LedgerId, action: &Action, old_path: &str) -> Result<(), EngineError> {
        let item_id = {
            let state = self.store.read();
            state.get(&action.drive_id, old_path).map(|e| e.item_id.clone())
        }
        .or_else(|| action.item_id.clone())
        .ok_or_else(|| core_err(ErrorKind::Unknown, format!("no known item id for {old_path}")))?;

        let new_parent_id = self.parent_item_id(&action.drive_id, &action.path);
        let new_name = path_util::leaf_name(&action.path).to_string();
        let item = self.remote.move_item(&item_id, new_parent_id.as_ref(), &new_name).await?;

        let now_ns = self.clock.now_ns();
        let local = action.view.local.as_ref();
        let size = local.and_then(|e| e.size).unwrap_or(item.size);
        let hash = local.and_then(|e| e.hash.clone()).or(item.hash.clone());
        let mtime_ns = local.and_then(|e| e.mtime_ns).unwrap_or(item.mtime_ns);

        self.store.commit_outcome(
            ledger_id.clone(),
            action.drive_id.clone(),
            old_path.to_string(),
            Some(action.path.clone()),
            size,
            hash,
            mtime_ns,
            now_ns,
        )?;
        Ok(())
    }

    /// Deletes the local copy (the remote-driven delete already happened).
    async fn local_delete(&self, _ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        let fs_path = path_util::to_fs_path(&self.sync_root, &action.path);
        match self.local.stat(&fs_path).await? {
            Some(_) if self.use_local_trash => self.move_to_trash(&fs_path).await?,
            Some(stat) if stat.is_dir => self.local.remove_dir(&fs_path).await?,
            Some(_) => self.local.remove_file(&fs_path).await?,
            None => {}
        }
        self.store.remove_entry(action.drive_id.clone(), action.path.clone())?;
        Ok(())
    }

    async fn move_to_trash(&self, fs_path: &std::path::Path) -> Result<(), EngineError> {
        let trash_dir = self.sync_root.join(".odsync-trash");
        self.local.create_dir_all(&trash_dir).await?;
        let now_ns = self.clock.now_ns();
        let name = fs_path.file_name().and_then(|n| n.to_str()).unwrap_or("item");
        let dest = trash_dir.join(format!("{now_ns}-{name}"));
        self.local.rename(fs_path, &dest).await?;
        Ok(())
    }

    /// Deletes the remote item (the local-driven delete already happened).
    async fn remote_delete(&self, _ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        let item_id = action
            .item_id
            .clone()
            .or_else(|| action.view.baseline.as_ref().map(|b| b.item_id.clone()));
        if let Some(item_id) = item_id {
            self.remote.delete_item(&item_id).await?;
        }
        self.store.remove_entry(action.drive_id.clone(), action.path.clone())?;
        Ok(())
    }

    /// Both sides deleted - drop the baseline row entirely.
    async fn cleanup(&self, _ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        self.store.remove_entry(action.drive_id.clone(), action.path.clone())?;
        Ok(())
    }

    /// Both sides already agree; just advance the synced tri-state.
    async fn update_synced(&self, ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        let now_ns = self.clock.now_ns();
        let local = action.view.local.as_ref();
        let remote = action.view.remote.as_ref();
        let size = local
            .and_then(|e| e.size)
            .or_else(|| remote.and_then(|e| e.size))
            .unwrap_or(0);
        let hash = local
            .and_then(|e| e.hash.clone())
            .or_else(|| remote.and_then(|e| e.hash.clone()));
        let mtime_ns = local
            .and_then(|e| e.mtime_ns)
            .or_else(|| remote.and_then(|e| e.mtime_ns))
            .unwrap_or(now_ns);

        self.store.commit_outcome(
            ledger_id.clone(),
            action.drive_id.clone(),
            action.path.clone(),
            None,
            size,
            hash,
            mtime_ns,
            now_ns,
        )?;
        Ok(())
    }

    /// Materializes the "keep both" convention: renames the local copy with
    /// a suffix and records a [`ConflictRecord`]. All three kinds resolve
    /// immediately: `keep_local`/`keep_remote` re-run the transfer that
    /// restores the losing side, and `keep_both` downloads remote onto the
    /// now-vacated original path after renaming the local copy aside, so the
    /// original never sits divergent waiting on a later cycle to notice.
    async fn conflict(&self, ledger_id: &LedgerId, action: &Action, kind: ConflictKind) -> Result<(), EngineError> {
        let now_ns = self.clock.now_ns();
        let item_id = action
            .item_id
            .clone()
            .or_else(|| action.view.baseline.as_ref().map(|b| b.item_id.clone()))
            .unwrap_or_else(|| ItemId::new(format!("unknown-{}", action.path)));

        let record = ConflictRecord::new(
            ConflictId::new(uuid::Uuid::new_v4().to_string()),
            action.drive_id.clone(),
            item_id,
            action.path.clone(),
            kind,
            now_ns,
        );
        self.store.record_conflict(record)?;

        match kind {
            ConflictKind::KeepBoth => {
                let fs_path = path_util::to_fs_path(&self.sync_root, &action.path);
                if self.local.stat(&fs_path).await?.is_some() {
                    let suffixed = conflict_suffixed_path(&action.path, now_ns);
                    let dest = path_util::to_fs_path(&self.sync_root, &suffixed);
                    self.local.rename(&fs_path, &dest).await?;

                    let local = action.view.local.as_ref();
                    self.store.observe_local(
                        action.drive_id.clone(),
                        suffixed,
                        ItemType::File,
                        local.and_then(|e| e.size).unwrap_or(0),
                        local.and_then(|e| e.hash.clone()),
                        local.and_then(|e| e.mtime_ns).unwrap_or(now_ns),
                        now_ns,
                    )?;
                }
                // Original path is now vacated (or never existed locally) -
                // download remote onto it so it doesn't sit divergent.
                self.download(ledger_id, action).await
            }
            // Remote deleted the item but local still holds it - recreate it remotely.
            ConflictKind::KeepLocal => self.upload(ledger_id, action).await,
            // Local deleted the item but remote still holds it - restore it locally.
            ConflictKind::KeepRemote => self.download(ledger_id, action).await,
        }
    }

    async fn execute_inner(&self, ledger_id: &LedgerId, action: &Action) -> Result<(), EngineError> {
        match &action.action_type {
            ActionType::FolderCreate => self.create_folder(ledger_id, action).await,
            ActionType::Download => self.download(ledger_id, action).await,
            ActionType::Upload => self.upload(ledger_id, action).await,
            ActionType::LocalMove { old_path } => {
                let old_path = old_path.clone();
                self.local_move(ledger_id, action, &old_path).await
            }
            ActionType::RemoteMove { old_path } => {
                let old_path = old_path.clone();
                self.remote_move(ledger_id, action, &old_path).await
            }
            ActionType::LocalDelete => self.local_delete(ledger_id, action).await,
            ActionType::RemoteDelete => self.remote_delete(ledger_id, action).await,
            ActionType::Conflict { kind } => self.conflict(ledger_id, action, *kind).await,
            ActionType::UpdateSynced => self.update_synced(ledger_id, action).await,
            ActionType::Cleanup => self.cleanup(ledger_id, action).await,
        }
    }
}

fn conflict_suffixed_path(path: &str, now_ns: i64) -> String {
    let parent = path_util::parent_path(path);
    let leaf = path_util::leaf_name(path);
    let (stem, ext) = match leaf.rfind('.') {
        Some(idx) if idx > 0 => (&leaf[..idx], &leaf[idx..]),
        _ => (leaf, ""),
    };
    let suffixed = format!("{stem} (conflicted copy {now_ns}){ext}");
    if parent.is_empty() {
        suffixed
    } else {
        format!("{parent}/{suffixed}")
    }
}

#[async_trait]
impl<R: RemoteApi, F: LocalFs, C: Clock> ActionRunner for Executor<R, F, C> {
    async fn run(&self, id: &LedgerId, action: &Action, cancel: CancellationToken) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let span = tracing::info_span!("action", action_type = ?action.kind(), path = %action.path);
        // Races the whole dispatch against `cancel` rather than checking it
        // once up front: dropping `execute_inner`'s future mid-flight
        // (whatever await point it's suspended at - a chunk upload, a
        // download read, a remote API call) is what actually aborts an
        // in-flight transfer instead of letting it run to completion.
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(()),
            result = self.execute_inner(id, action).instrument(span) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_adapters::hash::sha256_hex;
    use odsync_adapters::local::RealLocalFs;
    use odsync_adapters::remote::fake::FakeRemoteApi;
    use odsync_adapters::remote::{RemoteCall, RemoteItem};
    use odsync_core::{ChangeEvent, ChangeKind, CycleId, FakeClock, LedgerRow, Source};
    use odsync_storage::BaselineStore;
    use tempfile::tempdir;

    fn drive() -> DriveId {
        DriveId::new("d1")
    }

    fn open_store(dir: &std::path::Path) -> Arc<BaselineStore> {
        Arc::new(BaselineStore::open(dir).unwrap())
    }

    fn executor(
        remote: FakeRemoteApi,
        sync_root: PathBuf,
        store: Arc<BaselineStore>,
    ) -> Executor<FakeRemoteApi, RealLocalFs, FakeClock> {
        Executor::new(remote, RealLocalFs::new(), store, sync_root, FakeClock::default(), 1024 * 1024, false)
    }

    fn stage(store: &BaselineStore, action: &Action) -> LedgerId {
        let id = LedgerId::new("l1");
        let row = LedgerRow::from_action(id.clone(), CycleId::new("c1"), action, vec![]);
        store.write_actions(CycleId::new("c1"), vec![row]).unwrap();
        store.claim(id.clone(), 0).unwrap();
        id
    }

    #[tokio::test]
    async fn download_writes_file_and_commits_outcome() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("state"));
        let sync_root = dir.path().join("root");
        std::fs::create_dir_all(&sync_root).unwrap();

        let remote = FakeRemoteApi::new();
        let item_id = ItemId::new("i1");
        let content = b"hello world".to_vec();
        let hash = sha256_hex(&content);
        remote.seed_item(
            RemoteItem {
                item_id: item_id.clone(),
                parent_id: None,
                path: "a.txt".into(),
                name: "a.txt".into(),
                item_type: ItemType::File,
                size: content.len() as u64,
                hash: Some(hash.clone()),
                mtime_ns: 100,
                deleted: false,
            },
            Some(content.clone()),
        );

        let mut action = Action::new(ActionType::Download, "a.txt", drive());
        action.item_id = Some(item_id.clone());
        action.view.remote = Some(ChangeEvent {
            source: Source::Remote,
            kind: ChangeKind::Create,
            path: "a.txt".into(),
            name: "a.txt".into(),
            item_type: ItemType::File,
            size: Some(content.len() as u64),
            hash: Some(hash.clone()),
            mtime_ns: Some(100),
            is_deleted: false,
            item_id: Some(item_id),
        });

        let id = stage(&store, &action);
        let exec = executor(remote, sync_root.clone(), store.clone());
        exec.run(&id, &action, CancellationToken::new()).await.unwrap();

        assert_eq!(std::fs::read(sync_root.join("a.txt")).unwrap(), content);
        let entry = store.read().get(&drive(), "a.txt").cloned().unwrap();
        assert_eq!(entry.synced_hash.as_deref(), Some(hash.as_str()));
    }

    #[tokio::test]
    async fn upload_sends_bytes_and_commits_outcome() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("state"));
        let sync_root = dir.path().join("root");
        std::fs::create_dir_all(&sync_root).unwrap();
        std::fs::write(sync_root.join("b.txt"), b"local bytes").unwrap();

        let remote = FakeRemoteApi::new();
        let mut action = Action::new(ActionType::Upload, "b.txt", drive());
        action.view.local = Some(ChangeEvent {
            source: Source::Local,
            kind: ChangeKind::Create,
            path: "b.txt".into(),
            name: "b.txt".into(),
            item_type: ItemType::File,
            size: Some(11),
            hash: Some(sha256_hex(b"local bytes")),
            mtime_ns: Some(50),
            is_deleted: false,
            item_id: None,
        });

        let id = stage(&store, &action);
        let exec = executor(remote.clone(), sync_root, store.clone());
        exec.run(&id, &action, CancellationToken::new()).await.unwrap();

        let entry = store.read().get(&drive(), "b.txt").cloned().unwrap();
        assert!(entry.synced_hash.is_some());
        assert!(remote.calls().iter().any(|c| matches!(c, RemoteCall::UploadSimple { .. })));
    }

    #[tokio::test]
    async fn local_move_renames_file_and_rewrites_baseline_path() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("state"));
        let sync_root = dir.path().join("root");
        std::fs::create_dir_all(&sync_root).unwrap();
        std::fs::write(sync_root.join("old.txt"), b"content").unwrap();

        store
            .observe_remote(drive(), "old.txt".into(), ItemId::new("i1"), None, "old.txt".into(), ItemType::File, 7, Some("h1".into()), 0, 0)
            .unwrap();
        store
            .commit_outcome(LedgerId::new("seed"), drive(), "old.txt".into(), None, 7, Some("h1".into()), 0, 0)
            .unwrap();

        let action = Action::new(
            ActionType::LocalMove {
                old_path: "old.txt".into(),
            },
            "new.txt",
            drive(),
        );
        let id = stage(&store, &action);
        let exec = executor(FakeRemoteApi::new(), sync_root.clone(), store.clone());
        exec.run(&id, &action, CancellationToken::new()).await.unwrap();

        assert!(!sync_root.join("old.txt").exists());
        assert!(sync_root.join("new.txt").exists());
        assert!(store.read().get(&drive(), "old.txt").is_none());
        assert!(store.read().get(&drive(), "new.txt").is_some());
    }

    #[tokio::test]
    async fn local_delete_trashes_when_configured() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("state"));
        let sync_root = dir.path().join("root");
        std::fs::create_dir_all(&sync_root).unwrap();
        std::fs::write(sync_root.join("gone.txt"), b"bye").unwrap();
        store
            .observe_remote(drive(), "gone.txt".into(), ItemId::new("i1"), None, "gone.txt".into(), ItemType::File, 3, None, 0, 0)
            .unwrap();

        let action = Action::new(ActionType::LocalDelete, "gone.txt", drive());
        let id = stage(&store, &action);
        let exec = Executor::new(FakeRemoteApi::new(), RealLocalFs::new(), store.clone(), sync_root.clone(), FakeClock::default(), 1024, true);
        exec.run(&id, &action, CancellationToken::new()).await.unwrap();

        assert!(!sync_root.join("gone.txt").exists());
        assert!(sync_root.join(".odsync-trash").is_dir());
        assert!(store.read().get(&drive(), "gone.txt").is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_baseline_entry() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("state"));
        store
            .observe_remote(drive(), "gone.txt".into(), ItemId::new("i1"), None, "gone.txt".into(), ItemType::File, 1, None, 0, 0)
            .unwrap();

        let action = Action::new(ActionType::Cleanup, "gone.txt", drive());
        let id = stage(&store, &action);
        let exec = executor(FakeRemoteApi::new(), dir.path().join("root"), store.clone());
        exec.run(&id, &action, CancellationToken::new()).await.unwrap();

        assert!(store.read().get(&drive(), "gone.txt").is_none());
    }

    #[tokio::test]
    async fn run_is_a_no_op_once_cancelled() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("state"));
        let action = Action::new(ActionType::Cleanup, "a.txt", drive());
        let exec = executor(FakeRemoteApi::new(), dir.path().join("root"), store);

        let cancel = CancellationToken::new();
        cancel.cancel();
        exec.run(&LedgerId::new("l1"), &action, cancel).await.unwrap();
    }
}
