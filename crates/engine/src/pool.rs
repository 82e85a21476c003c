// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool draining the dependency tracker's ready queue (§4.8).
//! Generalizes the teacher's `Executor` single-dispatch-point pattern to a
//! fixed-size pool of tasks pulling from one shared queue, each wrapping its
//! unit of work in its own `tokio::spawn` so a panicking action surfaces as
//! a `JoinError` instead of taking the worker task down with it.

use crate::error::EngineError;
use crate::failure_tracker::FailureTracker;
use crate::tracker::{DependencyTracker, TrackedAction};
use async_trait::async_trait;
use odsync_core::{Action, ActionTypeKind, Clock, LedgerId};
use odsync_storage::BaselineStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Executes one planned action to completion, including committing its
/// baseline outcome on success. Implemented by `crate::executor::Executor`;
/// abstracted here so the pool can be tested without a real executor. The
/// ledger id is threaded through so the runner can commit the baseline
/// outcome against the same row the pool will mark complete.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, id: &LedgerId, action: &Action, cancel: CancellationToken) -> Result<(), EngineError>;
}

const MAX_DIAGNOSTICS: usize = 50;

/// Aggregate outcome counters for one pool's lifetime, plus a capped sample
/// of recent failures for diagnostics (not every failure — see
/// `dropped_diagnostics`).
#[derive(Debug, Default, Clone)]
pub struct PoolStats {
    pub succeeded: u64,
    pub failed: u64,
    pub diagnostics: Vec<String>,
    pub dropped_diagnostics: u64,
    pub by_action_type: HashMap<ActionTypeKind, u64>,
    pub bytes_transferred: u64,
}

impl PoolStats {
    fn push_diagnostic(&mut self, message: String) {
        if self.diagnostics.len() < MAX_DIAGNOSTICS {
            self.diagnostics.push(message);
        } else {
            self.dropped_diagnostics += 1;
        }
    }
}

/// A running pool of workers draining one `DependencyTracker`'s ready queue.
pub struct WorkerPool {
    stats: Arc<Mutex<PoolStats>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Default worker count: the host's available parallelism, floored at 4
    /// so small machines still get useful concurrency for I/O-bound work.
    pub fn default_worker_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .max(4)
    }

    pub fn spawn<C: Clock>(
        tracker: Arc<DependencyTracker>,
        store: Arc<BaselineStore>,
        runner: Arc<dyn ActionRunner>,
        failures: Arc<FailureTracker>,
        clock: C,
        worker_count: usize,
    ) -> Self {
        let stats = Arc::new(Mutex::new(PoolStats::default()));
        let rx = Arc::new(AsyncMutex::new(tracker.ready_receiver()));
        let mut handles = Vec::with_capacity(worker_count);

        for worker_idx in 0..worker_count {
            let rx = rx.clone();
            let tracker = tracker.clone();
            let store = store.clone();
            let runner = runner.clone();
            let failures = failures.clone();
            let clock = clock.clone();
            let stats = stats.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let tracked = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(tracked) = tracked else { break };
                    run_one(worker_idx, &tracker, &store, &runner, &failures, &clock, &stats, tracked).await;
                }
            }));
        }

        Self { stats, handles }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    /// Wait for every worker task to exit (the ready channel was dropped and
    /// drained). Used by `RunOnce` once the tracker reports quiescence.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one<C: Clock>(
    worker_idx: usize,
    tracker: &DependencyTracker,
    store: &BaselineStore,
    runner: &Arc<dyn ActionRunner>,
    failures: &FailureTracker,
    clock: &C,
    stats: &Mutex<PoolStats>,
    tracked: TrackedAction,
) {
    let path = tracked.action.path.clone();
    let now_ns = clock.now_ns();

    if failures.is_cooling_down(&path, now_ns) {
        let _ = store.fail(tracked.id.clone(), "path is cooling down after repeated failures".into());
        tracker.complete(tracked.id);
        return;
    }

    if let Err(e) = store.claim(tracked.id.clone(), now_ns) {
        tracing::warn!(ledger_id = %tracked.id, error = %e, "could not claim ledger row");
        tracker.complete(tracked.id);
        return;
    }

    let span = tracing::info_span!("worker", worker = worker_idx, ledger_id = %tracked.id, path = %path);
    let runner = runner.clone();
    let id = tracked.id.clone();
    let action = tracked.action.clone();
    let cancel = tracked.cancel.clone();
    let join = tokio::spawn(async move { runner.run(&id, &action, cancel).await }.instrument(span));

    match join.await {
        Ok(Ok(())) => {
            failures.record_success(&path);
            let _ = store.complete(tracked.id.clone());
            let mut stats = stats.lock();
            stats.succeeded += 1;
            stats.bytes_transferred += tracked.action.transfer_bytes();
            *stats.by_action_type.entry(tracked.action.kind()).or_insert(0) += 1;
        }
        Ok(Err(e)) => {
            let message = e.to_string();
            let _ = store.fail(tracked.id.clone(), message.clone());
            failures.record_failure(&path, now_ns);
            let mut stats = stats.lock();
            stats.failed += 1;
            stats.push_diagnostic(format!("{path}: {message}"));
        }
        Err(join_err) if join_err.is_panic() => {
            let message = format!("worker task panicked while executing {path}");
            let _ = store.fail(tracked.id.clone(), message.clone());
            failures.record_failure(&path, now_ns);
            let mut stats = stats.lock();
            stats.failed += 1;
            stats.push_diagnostic(message);
        }
        Err(_cancelled) => {
            let _ = store.cancel(tracked.id.clone());
        }
    }

    tracker.complete(tracked.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::DependencyTracker;
    use odsync_core::{ActionType, CycleId, DriveId, FakeClock, LedgerId};
    use odsync_storage::BaselineStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct AlwaysSucceeds(Arc<AtomicUsize>);

    #[async_trait]
    impl ActionRunner for AlwaysSucceeds {
        async fn run(&self, _id: &LedgerId, _action: &Action, _cancel: CancellationToken) -> Result<(), EngineError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ActionRunner for AlwaysFails {
        async fn run(&self, _id: &LedgerId, _action: &Action, _cancel: CancellationToken) -> Result<(), EngineError> {
            Err(crate::error::core_err(odsync_core::ErrorKind::Unknown, "boom"))
        }
    }

    fn open_store(dir: &std::path::Path) -> Arc<BaselineStore> {
        Arc::new(BaselineStore::open(dir).unwrap())
    }

    #[tokio::test]
    async fn successful_action_updates_stats_and_completes_tracker() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let tracker = Arc::new(DependencyTracker::new());
        let action = Action::new(ActionType::Download, "a.txt", DriveId::new("d1"));
        let row = odsync_core::LedgerRow::from_action(LedgerId::new("l1"), CycleId::new("c1"), &action, vec![]);
        store.write_actions(CycleId::new("c1"), vec![row]).unwrap();
        tracker.add(action, LedgerId::new("l1"), vec![], CycleId::new("c1"));

        let calls = Arc::new(AtomicUsize::new(0));
        let runner: Arc<dyn ActionRunner> = Arc::new(AlwaysSucceeds(calls.clone()));
        let failures = Arc::new(FailureTracker::new(3, 1_000));
        let pool = WorkerPool::spawn(tracker.clone(), store.clone(), runner, failures, FakeClock::default(), 2);

        tokio::time::timeout(std::time::Duration::from_secs(1), tracker.done())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn failed_action_is_recorded_and_tracker_still_completes() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        let tracker = Arc::new(DependencyTracker::new());
        let action = Action::new(ActionType::Upload, "b.txt", DriveId::new("d1"));
        let row = odsync_core::LedgerRow::from_action(LedgerId::new("l1"), CycleId::new("c1"), &action, vec![]);
        store.write_actions(CycleId::new("c1"), vec![row]).unwrap();
        tracker.add(action, LedgerId::new("l1"), vec![], CycleId::new("c1"));

        let runner: Arc<dyn ActionRunner> = Arc::new(AlwaysFails);
        let failures = Arc::new(FailureTracker::new(3, 1_000));
        let pool = WorkerPool::spawn(tracker.clone(), store.clone(), runner, failures.clone(), FakeClock::default(), 1);

        tokio::time::timeout(std::time::Duration::from_secs(1), tracker.done())
            .await
            .unwrap();
        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.diagnostics.len(), 1);
        assert!(failures.is_cooling_down("b.txt", 0) == false); // below threshold after 1 failure
    }
}
