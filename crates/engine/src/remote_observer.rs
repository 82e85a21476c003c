// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote delta stream observer (§4.3): pulls pages from the drive's
//! pageable delta endpoint and translates each item into a [`ChangeEvent`],
//! both as a one-shot pass for `RunOnce` and a polling loop for watch mode.

use crate::error::EngineError;
use odsync_adapters::remote::{RemoteApi, RemoteError, RemoteItem};
use odsync_core::{ChangeEvent, ChangeKind, Source};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn to_change_event(item: &RemoteItem) -> ChangeEvent {
    ChangeEvent {
        source: Source::Remote,
        kind: if item.deleted { ChangeKind::Delete } else { ChangeKind::Modify },
        path: item.path.clone(),
        name: item.name.clone(),
        item_type: item.item_type,
        size: Some(item.size),
        hash: item.hash.clone(),
        mtime_ns: Some(item.mtime_ns),
        is_deleted: item.deleted,
        item_id: Some(item.item_id.clone()),
    }
}

/// Observes one drive's remote delta stream through a single [`RemoteApi`].
pub struct RemoteObserver<R> {
    remote: R,
    current_token: Mutex<Option<String>>,
}

impl<R: RemoteApi> RemoteObserver<R> {
    pub fn new(remote: R, saved_token: Option<String>) -> Self {
        Self { remote, current_token: Mutex::new(saved_token) }
    }

    /// The most recently observed `delta_link`. The caller is responsible
    /// for persisting this to the baseline store only once the cycle it
    /// came from fully commits — installing it earlier would skip changes
    /// on a crash mid-cycle.
    pub fn current_delta_token(&self) -> Option<String> {
        self.current_token.lock().clone()
    }

    /// Walks every page starting from `saved_token` until the final page
    /// (no `next_link`), returning the accumulated events and the next
    /// cycle's token. On a server-signaled `DeltaExpired`, retries once with
    /// an empty token (full resync) per §4.3.
    pub async fn full_delta(
        &self,
        saved_token: Option<&str>,
    ) -> Result<(Vec<ChangeEvent>, Option<String>), EngineError> {
        let mut events = Vec::new();
        let mut page = match self.remote.fetch_delta(saved_token).await {
            Ok(page) => page,
            Err(RemoteError::DeltaExpired) => self.remote.fetch_delta(None).await?,
            Err(e) => return Err(e.into()),
        };

        loop {
            events.extend(page.items.iter().map(to_change_event));
            match page.next_link.clone() {
                Some(next) => page = self.remote.fetch_delta(Some(&next)).await?,
                None => break,
            }
        }

        *self.current_token.lock() = page.delta_link.clone();
        Ok((events, page.delta_link))
    }

    /// Polls the delta endpoint until `cancel` fires, forwarding each
    /// non-empty batch on `tx`. Sleeps `poll_interval` after a pass that
    /// yields nothing, so a quiet drive doesn't spin.
    pub async fn watch(
        &self,
        saved_token: Option<String>,
        tx: mpsc::Sender<Vec<ChangeEvent>>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        let mut token = saved_token;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let (events, next_token) = self.full_delta(token.as_deref()).await?;
            token = next_token;

            if !events.is_empty() {
                if tx.send(events).await.is_err() {
                    return Ok(());
                }
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_adapters::remote::fake::FakeRemoteApi;
    use odsync_adapters::remote::DeltaPage;
    use odsync_core::ItemId;
    use odsync_core::ItemType;

    fn item(path: &str, hash: &str) -> RemoteItem {
        RemoteItem {
            item_id: ItemId::new(format!("id-{path}")),
            parent_id: None,
            path: path.into(),
            name: path.into(),
            item_type: ItemType::File,
            size: 10,
            hash: Some(hash.into()),
            mtime_ns: 0,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn full_delta_walks_pages_until_exhausted() {
        let fake = FakeRemoteApi::new();
        fake.queue_delta_page(DeltaPage {
            items: vec![item("a.txt", "h1")],
            next_link: Some("page2".into()),
            delta_link: None,
        });
        fake.queue_delta_page(DeltaPage {
            items: vec![item("b.txt", "h2")],
            next_link: None,
            delta_link: Some("v2".into()),
        });

        let observer = RemoteObserver::new(fake, None);
        let (events, next_token) = observer.full_delta(None).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].path, "a.txt");
        assert_eq!(events[1].path, "b.txt");
        assert_eq!(next_token.as_deref(), Some("v2"));
        assert_eq!(observer.current_delta_token().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn full_delta_retries_once_on_expired_token() {
        let fake = FakeRemoteApi::new();
        fake.seed_item(item("a.txt", "h1"), None);
        fake.expire_token("stale-token");

        let observer = RemoteObserver::new(fake, None);
        let (events, next_token) = observer.full_delta(Some("stale-token")).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(next_token.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn full_delta_marks_deleted_items_as_delete_events() {
        let fake = FakeRemoteApi::new();
        let mut deleted = item("gone.txt", "h1");
        deleted.deleted = true;
        fake.queue_delta_page(DeltaPage {
            items: vec![deleted],
            next_link: None,
            delta_link: Some("v1".into()),
        });

        let observer = RemoteObserver::new(fake, None);
        let (events, _) = observer.full_delta(None).await.unwrap();
        assert_eq!(events[0].kind, ChangeKind::Delete);
        assert!(events[0].is_deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_stops_immediately_when_already_cancelled() {
        let fake = FakeRemoteApi::new();
        let observer = RemoteObserver::new(fake, None);
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        observer
            .watch(None, tx, Duration::from_secs(30), cancel)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn watch_forwards_events_and_sleeps_between_empty_polls() {
        let fake = FakeRemoteApi::new();
        fake.seed_item(item("a.txt", "h1"), None);
        let observer = RemoteObserver::new(fake, None);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        let task = tokio::spawn(async move {
            observer
                .watch(None, tx, Duration::from_secs(60), cancel_clone)
                .await
        });

        let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
    }
}
