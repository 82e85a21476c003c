// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-path event coalescing (§4.5). Generalizes the teacher's flat
//! `Scheduler` timer set into a debounce keyed by path: one pending flush
//! deadline for the whole buffer, pushed back by each new event, with a
//! floor interval so a sustained stream of writes still makes progress.

use odsync_core::ChangeEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

pub use odsync_core::PathChanges;

/// Coalesces observed changes per path until flushed.
#[derive(Default)]
pub struct EventBuffer {
    inner: Mutex<HashMap<String, PathChanges>>,
    notify: Notify,
    last_event_at: Mutex<Option<Instant>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one observed event into the path's coalesced state.
    pub fn add(&self, event: ChangeEvent) {
        {
            let mut map = self.inner.lock();
            map.entry(event.path.clone())
                .or_insert_with(|| PathChanges::new(event.path.clone()))
                .merge(event);
        }
        *self.last_event_at.lock() = Some(Instant::now());
        self.notify.notify_one();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Drain and return everything buffered so far, ordered by path.
    pub fn flush_immediate(&self) -> Vec<PathChanges> {
        let mut map = self.inner.lock();
        let mut out: Vec<PathChanges> = map.drain().map(|(_, v)| v).collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }
}

/// Runs a trailing-debounce flush loop: a timer restarts on every new event
/// and fires `window` after the last one; `min_interval` bounds how long a
/// sustained stream of events can delay a flush. Exits when `cancel` fires.
pub async fn run_debounced_flusher(
    buffer: Arc<EventBuffer>,
    window: Duration,
    min_interval: Duration,
    tx: mpsc::Sender<Vec<PathChanges>>,
    cancel: CancellationToken,
) {
    let mut last_flush = Instant::now();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = buffer.notify.notified() => {}
        }

        loop {
            let last_event = match *buffer.last_event_at.lock() {
                Some(t) => t,
                None => break,
            };
            let since_last_event = last_event.elapsed();
            let since_last_flush = last_flush.elapsed();
            if since_last_event >= window || since_last_flush >= min_interval {
                break;
            }
            let wait = window
                .saturating_sub(since_last_event)
                .min(min_interval.saturating_sub(since_last_flush));
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let batch = buffer.flush_immediate();
        last_flush = Instant::now();
        if !batch.is_empty() && tx.send(batch).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_core::{ChangeKind, ItemType, Source};

    fn ev(path: &str) -> ChangeEvent {
        ChangeEvent {
            source: Source::Local,
            kind: ChangeKind::Modify,
            path: path.into(),
            name: path.into(),
            item_type: ItemType::File,
            size: Some(1),
            hash: Some("h".into()),
            mtime_ns: Some(0),
            is_deleted: false,
            item_id: None,
        }
    }

    #[test]
    fn add_coalesces_same_path() {
        let buffer = EventBuffer::new();
        buffer.add(ev("a.txt"));
        buffer.add(ev("a.txt"));
        buffer.add(ev("b.txt"));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn flush_immediate_drains_in_path_order() {
        let buffer = EventBuffer::new();
        buffer.add(ev("b.txt"));
        buffer.add(ev("a.txt"));
        let batch = buffer.flush_immediate();
        assert_eq!(batch.iter().map(|p| p.path.as_str()).collect::<Vec<_>>(), vec!["a.txt", "b.txt"]);
        assert!(buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_fires_window_after_last_event() {
        let buffer = Arc::new(EventBuffer::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_debounced_flusher(
            buffer.clone(),
            Duration::from_millis(100),
            Duration::from_secs(10),
            tx,
            cancel.clone(),
        ));

        buffer.add(ev("a.txt"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        buffer.add(ev("a.txt")); // pushes the deadline back

        let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);

        cancel.cancel();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_forces_progress_under_sustained_input() {
        let buffer = Arc::new(EventBuffer::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_debounced_flusher(
            buffer.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(100),
            tx,
            cancel.clone(),
        ));

        buffer.add(ev("a.txt"));
        // Even though window (1h) never elapses, min_interval forces a flush.
        let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);

        cancel.cancel();
        let _ = task.await;
    }
}
