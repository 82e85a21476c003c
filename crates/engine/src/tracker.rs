// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory dependency tracker for one plan's (or watch mode's rolling set
//! of) actions (§4.7). Generalizes the teacher's `Scheduler` map-of-state
//! pattern to a dependency graph instead of a flat timer set.

use odsync_core::{Action, CycleId, LedgerId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// One action handed to a worker from the ready channel: its identity, the
/// planned action, and a per-action cancel handle the watch-mode intake can
/// fire to supersede it.
pub struct TrackedAction {
    pub id: LedgerId,
    pub action: Action,
    pub cycle_id: CycleId,
    pub cancel: CancellationToken,
}

struct Waiting {
    id: LedgerId,
    action: Action,
    cycle_id: CycleId,
    path: String,
    cancel: CancellationToken,
    outstanding: HashSet<LedgerId>,
}

struct Inner {
    waiting: HashMap<LedgerId, Waiting>,
    /// Cancel handle + path for every action still in flight (waiting or
    /// already dispatched to the ready channel), so `cancel_by_path` and
    /// `has_in_flight` work regardless of dispatch state.
    in_flight: HashMap<LedgerId, (String, CancellationToken)>,
    by_path: HashMap<String, LedgerId>,
    completed: HashSet<LedgerId>,
    by_cycle: HashMap<CycleId, HashSet<LedgerId>>,
}

/// Tracks a plan's (or a rolling watch-mode set of) in-flight actions and
/// their dependency edges, feeding a ready queue as dependencies resolve.
pub struct DependencyTracker {
    inner: Mutex<Inner>,
    ready_tx: mpsc::UnboundedSender<TrackedAction>,
    ready_rx: Mutex<Option<mpsc::UnboundedReceiver<TrackedAction>>>,
    done: Notify,
    cycle_done: Mutex<HashMap<CycleId, Vec<tokio::sync::oneshot::Sender<()>>>>,
}

impl Default for DependencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTracker {
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        Self {
            inner: Mutex::new(Inner {
                waiting: HashMap::new(),
                in_flight: HashMap::new(),
                by_path: HashMap::new(),
                completed: HashSet::new(),
                by_cycle: HashMap::new(),
            }),
            ready_tx,
            ready_rx: Mutex::new(Some(ready_rx)),
            done: Notify::new(),
            cycle_done: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a tracked action. If none of its deps are outstanding, it is
    /// immediately enqueued on the ready channel.
    pub fn add(&self, action: Action, id: LedgerId, dep_ids: Vec<LedgerId>, cycle_id: CycleId) {
        let mut inner = self.inner.lock();
        let path = action.path.clone();
        let outstanding: HashSet<LedgerId> = dep_ids
            .into_iter()
            .filter(|d| !inner.completed.contains(d))
            .collect();
        let cancel = CancellationToken::new();

        inner
            .by_cycle
            .entry(cycle_id.clone())
            .or_default()
            .insert(id.clone());
        inner.by_path.insert(path.clone(), id.clone());
        inner.in_flight.insert(id.clone(), (path.clone(), cancel.clone()));

        if outstanding.is_empty() {
            let _ = self.ready_tx.send(TrackedAction {
                id,
                action,
                cycle_id,
                cancel,
            });
        } else {
            inner.waiting.insert(
                id.clone(),
                Waiting {
                    id,
                    action,
                    cycle_id,
                    path,
                    cancel,
                    outstanding,
                },
            );
        }
    }

    /// Take the receive-only end of the ready channel. Panics if called more
    /// than once (there is exactly one worker pool per tracker).
    pub fn ready_receiver(&self) -> mpsc::UnboundedReceiver<TrackedAction> {
        self.ready_rx
            .lock()
            .take()
            .expect("ready_receiver already taken")
    }

    /// Mark an action complete: scan waiters for a now-satisfied dependency,
    /// enqueue anything newly ready, and signal quiescence watchers.
    pub fn complete(&self, id: LedgerId) {
        let mut inner = self.inner.lock();
        inner.completed.insert(id.clone());

        if let Some((path, _)) = inner.in_flight.remove(&id) {
            if inner.by_path.get(&path) == Some(&id) {
                inner.by_path.remove(&path);
            }
        }

        let waiter_ids: Vec<LedgerId> = inner.waiting.keys().cloned().collect();
        let mut newly_ready = Vec::new();
        for waiter_id in waiter_ids {
            if let Some(w) = inner.waiting.get_mut(&waiter_id) {
                w.outstanding.remove(&id);
                if w.outstanding.is_empty() {
                    newly_ready.push(waiter_id);
                }
            }
        }
        for ready_id in newly_ready {
            if let Some(w) = inner.waiting.remove(&ready_id) {
                let _ = self.ready_tx.send(TrackedAction {
                    id: w.id,
                    action: w.action,
                    cycle_id: w.cycle_id,
                    cancel: w.cancel,
                });
            }
        }

        let quiescent = inner.waiting.is_empty() && inner.in_flight.is_empty();
        let finished_cycles: Vec<CycleId> = inner
            .by_cycle
            .iter()
            .filter(|(_, ids)| ids.iter().all(|i| inner.completed.contains(i)))
            .map(|(c, _)| c.clone())
            .collect();
        drop(inner);

        if quiescent {
            self.done.notify_waiters();
        }
        if !finished_cycles.is_empty() {
            let mut waiters = self.cycle_done.lock();
            for cycle_id in finished_cycles {
                if let Some(senders) = waiters.remove(&cycle_id) {
                    for tx in senders {
                        let _ = tx.send(());
                    }
                }
            }
        }
    }

    /// Resolves once no tracked action remains pending or in-flight
    /// (one-shot semantics for `RunOnce`).
    pub async fn done(&self) {
        loop {
            let notified = self.done.notified();
            {
                let inner = self.inner.lock();
                if inner.waiting.is_empty() && inner.in_flight.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Resolves once every action belonging to `cycle_id` has reached a
    /// terminal status (watch mode, per-cycle token advance).
    pub async fn cycle_done(&self, cycle_id: CycleId) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        {
            let inner = self.inner.lock();
            let all_done = inner
                .by_cycle
                .get(&cycle_id)
                .is_none_or(|ids| ids.iter().all(|i| inner.completed.contains(i)));
            if all_done {
                return;
            }
        }
        self.cycle_done.lock().entry(cycle_id).or_default().push(tx);
        let _ = rx.await;
    }

    /// Whether any in-flight (waiting or dispatched) action targets `path`.
    pub fn has_in_flight(&self, path: &str) -> bool {
        self.inner.lock().by_path.contains_key(path)
    }

    /// Cancel the in-flight action (if any) targeting `path`, so the watch
    /// intake can supersede it with a fresh plan for the path's new state.
    pub fn cancel_by_path(&self, path: &str) {
        let inner = self.inner.lock();
        if let Some(id) = inner.by_path.get(path) {
            if let Some((_, cancel)) = inner.in_flight.get(id) {
                cancel.cancel();
            }
        }
    }

    /// Release per-cycle bookkeeping once a cycle's actions are all terminal.
    pub fn cleanup_cycle(&self, cycle_id: &CycleId) {
        let mut inner = self.inner.lock();
        if let Some(ids) = inner.by_cycle.remove(cycle_id) {
            for id in ids {
                inner.completed.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsync_core::{ActionType, DriveId};

    fn action(path: &str) -> Action {
        Action::new(ActionType::Download, path, DriveId::new("d1"))
    }

    #[tokio::test]
    async fn action_with_no_deps_is_immediately_ready() {
        let tracker = DependencyTracker::new();
        let mut rx = tracker.ready_receiver();
        tracker.add(action("a.txt"), LedgerId::new("l1"), vec![], CycleId::new("c1"));
        let ready = rx.recv().await.unwrap();
        assert_eq!(ready.id, LedgerId::new("l1"));
    }

    #[tokio::test]
    async fn waiter_becomes_ready_once_its_dep_completes() {
        let tracker = DependencyTracker::new();
        let mut rx = tracker.ready_receiver();
        tracker.add(action("dir"), LedgerId::new("l1"), vec![], CycleId::new("c1"));
        tracker.add(
            action("dir/child.txt"),
            LedgerId::new("l2"),
            vec![LedgerId::new("l1")],
            CycleId::new("c1"),
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.id, LedgerId::new("l1"));

        tracker.complete(LedgerId::new("l1"));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.id, LedgerId::new("l2"));
    }

    #[tokio::test]
    async fn done_resolves_once_all_actions_complete() {
        let tracker = DependencyTracker::new();
        let mut rx = tracker.ready_receiver();
        tracker.add(action("a.txt"), LedgerId::new("l1"), vec![], CycleId::new("c1"));
        let ready = rx.recv().await.unwrap();
        tracker.complete(ready.id);
        tokio::time::timeout(std::time::Duration::from_secs(1), tracker.done())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cycle_done_resolves_once_cycle_actions_complete() {
        let tracker = DependencyTracker::new();
        let mut rx = tracker.ready_receiver();
        tracker.add(action("a.txt"), LedgerId::new("l1"), vec![], CycleId::new("c1"));
        let ready = rx.recv().await.unwrap();
        tracker.complete(ready.id);
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            tracker.cycle_done(CycleId::new("c1")),
        )
        .await
        .unwrap();
    }

    #[test]
    fn has_in_flight_and_cancel_by_path() {
        let tracker = DependencyTracker::new();
        let _rx = tracker.ready_receiver();
        tracker.add(action("a.txt"), LedgerId::new("l1"), vec![], CycleId::new("c1"));
        assert!(tracker.has_in_flight("a.txt"));
        assert!(!tracker.has_in_flight("b.txt"));
        tracker.cancel_by_path("a.txt");
        let inner = tracker.inner.lock();
        let (_, cancel) = inner.in_flight.get(&LedgerId::new("l1")).unwrap();
        assert!(cancel.is_cancelled());
    }
}
