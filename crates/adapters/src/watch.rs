// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin wrapper over the `notify` crate producing a normalized stream of
//! raw filesystem events. Translation into domain `ChangeEvent`s (stat'ing
//! the path, deciding create vs modify, debounce) is the local observer's
//! job, not this module's — this only normalizes across backends.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// The kind of raw change `notify` reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFsEventKind {
    Create,
    Modify,
    Remove,
    /// A rename/move; `notify` reports the two halves as separate events on
    /// most backends, so this only fires when the platform gives us both
    /// paths in one atomic event.
    Rename,
    /// Anything else (metadata-only changes, access events) the observer
    /// may choose to ignore.
    Other,
}

/// One normalized filesystem event under the watched root.
#[derive(Debug, Clone)]
pub struct RawFsEvent {
    pub kind: RawFsEventKind,
    pub paths: Vec<PathBuf>,
}

fn normalize_kind(kind: &EventKind) -> RawFsEventKind {
    match kind {
        EventKind::Create(_) => RawFsEventKind::Create,
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => RawFsEventKind::Rename,
        EventKind::Modify(_) => RawFsEventKind::Modify,
        EventKind::Remove(_) => RawFsEventKind::Remove,
        _ => RawFsEventKind::Other,
    }
}

/// Holds the underlying `notify` watcher alive; dropping this stops watching.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Start recursively watching `root`, forwarding normalized events to
    /// `tx`. The returned [`FsWatcher`] must be kept alive for the duration
    /// of watching.
    pub fn watch(root: &Path, tx: mpsc::Sender<RawFsEvent>) -> Result<Self, notify::Error> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            let raw = RawFsEvent {
                kind: normalize_kind(&event.kind),
                paths: event.paths.clone(),
            };
            let _ = tx.blocking_send(raw);
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn create_and_write_produce_events() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(32);
        let _watcher = FsWatcher::watch(dir.path(), tx).unwrap();

        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for fs event")
            .expect("channel closed");
        assert!(event.paths.iter().any(|p| p == &file_path));
    }

    #[tokio::test]
    async fn remove_produces_remove_event() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();

        let (tx, mut rx) = mpsc::channel(32);
        let _watcher = FsWatcher::watch(dir.path(), tx).unwrap();

        std::fs::remove_file(&file_path).unwrap();

        let mut saw_remove = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Some(event)) if event.kind == RawFsEventKind::Remove => {
                    saw_remove = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_remove, "expected a Remove event for the deleted file");
    }
}
