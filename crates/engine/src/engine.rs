// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root wiring the baseline store, remote/local observers,
//! planner, dependency tracker, worker pool, and executor into the two
//! entry points the daemon/CLI drive: [`Engine::run_once`] and
//! [`Engine::run_watch`]. Generalizes the teacher's `Runtime` single
//! composition root to the sync engine's moving parts.

use crate::buffer::EventBuffer;
use crate::config::SyncConfig;
use crate::error::EngineError;
use crate::executor::Executor;
use crate::failure_tracker::FailureTracker;
use crate::local_observer::LocalObserver;
use crate::planner::{self, BigDeleteThresholds};
use crate::pool::{ActionRunner, PoolStats, WorkerPool};
use crate::remote_observer::RemoteObserver;
use crate::tracker::DependencyTracker;
use odsync_adapters::local::LocalFs;
use odsync_adapters::remote::RemoteApi;
use odsync_core::{ActionTypeKind, ChangeEvent, Clock, ConflictId, CycleId, DriveId, LedgerId, LedgerRow};
use odsync_storage::BaselineStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Which side(s) `RunOnce` observes and acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Bidirectional,
    DownloadOnly,
    UploadOnly,
}

/// Per-cycle overrides for [`Engine::run_once`], mapped directly from the
/// CLI's `--dry-run`/`--force` flags (§4.13).
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOnceOptions {
    pub mode: SyncMode,
    pub dry_run: bool,
    pub force: bool,
}

/// Outcome of one or more sync cycles.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub diagnostics: Vec<String>,
    pub by_action_type: HashMap<ActionTypeKind, u64>,
    pub bytes_transferred: u64,
    pub dry_run: bool,
    pub duration: Duration,
}

impl From<PoolStats> for RunSummary {
    fn from(stats: PoolStats) -> Self {
        Self {
            succeeded: stats.succeeded,
            failed: stats.failed,
            diagnostics: stats.diagnostics,
            by_action_type: stats.by_action_type,
            bytes_transferred: stats.bytes_transferred,
            dry_run: false,
            duration: Duration::ZERO,
        }
    }
}

impl RunSummary {
    fn accumulate(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.diagnostics.extend(other.diagnostics);
        self.bytes_transferred += other.bytes_transferred;
        for (kind, count) in other.by_action_type {
            *self.by_action_type.entry(kind).or_insert(0) += count;
        }
        self.duration += other.duration;
    }
}

/// Ties every moving part of one drive's sync together. `R`/`F`/`C` are the
/// remote, local-filesystem, and clock capability seams, swapped for fakes
/// in tests exactly as `executor`/`pool` are individually.
pub struct Engine<R, F, C> {
    store: Arc<BaselineStore>,
    remote: RemoteObserver<R>,
    local: LocalObserver<F, C>,
    drive_id: DriveId,
    config: SyncConfig,
    clock: C,
    executor: Arc<dyn ActionRunner>,
}

impl<R: RemoteApi, F: LocalFs, C: Clock> Engine<R, F, C> {
    pub fn new(store: Arc<BaselineStore>, remote_api: R, local_fs: F, drive_id: DriveId, config: SyncConfig, clock: C) -> Self {
        let saved_token = store.read().delta_token(&drive_id).map(str::to_string);
        let remote = RemoteObserver::new(remote_api.clone(), saved_token);
        let local = LocalObserver::new(
            local_fs.clone(),
            store.clone(),
            config.sync_root.clone(),
            drive_id.clone(),
            config.ignore_marker.clone(),
            clock.clone(),
        );
        let executor: Arc<dyn ActionRunner> = Arc::new(Executor::new(
            remote_api,
            local_fs,
            store.clone(),
            config.sync_root.clone(),
            clock.clone(),
            config.max_file_size,
            config.use_local_trash,
        ));

        Self { store, remote, local, drive_id, config, clock, executor }
    }

    fn thresholds(&self, force_override: bool) -> BigDeleteThresholds {
        BigDeleteThresholds {
            min_items: self.config.big_delete.min_items,
            threshold_count: self.config.big_delete.threshold_count,
            threshold_percent: self.config.big_delete.threshold_percent,
            force: self.config.force || force_override,
        }
    }

    fn worker_count(&self) -> usize {
        (self.config.transfer.download_workers + self.config.transfer.upload_workers)
            .max(1)
    }

    /// One combined local + remote observation pass, coalesced into
    /// per-path changes ready for the planner. `mode` skips the side that
    /// wouldn't feed any action anyway: download-only skips the local scan,
    /// upload-only skips the remote delta pull.
    async fn observe_once(&self, mode: SyncMode) -> Result<Vec<odsync_core::PathChanges>, EngineError> {
        let buffer = EventBuffer::new();
        if mode != SyncMode::DownloadOnly {
            for event in self.local.full_scan().await? {
                buffer.add(event);
            }
        }
        if mode != SyncMode::UploadOnly {
            let saved_token = self.remote.current_delta_token();
            let (remote_events, _) = self.remote.full_delta(saved_token.as_deref()).await?;
            for event in remote_events {
                buffer.add(event);
            }
        }
        Ok(buffer.flush_immediate())
    }

    /// Write an [`planner::ActionPlan`] to the ledger, drain it through a
    /// fresh worker pool, and — on a zero-failure cycle — commit the
    /// remote observer's delta token so the next cycle resumes from here.
    /// `dry_run` reports what the plan would have done without writing the
    /// ledger or touching a single byte on either side.
    async fn dispatch_plan(
        &self,
        plan: planner::ActionPlan,
        cancel: CancellationToken,
        dry_run: bool,
    ) -> Result<RunSummary, EngineError> {
        let start_ns = self.clock.now_ns();

        if dry_run {
            let mut by_action_type: HashMap<ActionTypeKind, u64> = HashMap::new();
            let mut bytes_transferred = 0;
            for action in &plan.actions {
                *by_action_type.entry(action.kind()).or_insert(0) += 1;
                bytes_transferred += action.transfer_bytes();
            }
            let elapsed = (self.clock.now_ns() - start_ns).max(0) as u64;
            return Ok(RunSummary {
                succeeded: 0,
                failed: 0,
                diagnostics: Vec::new(),
                by_action_type,
                bytes_transferred,
                dry_run: true,
                duration: Duration::from_nanos(elapsed),
            });
        }

        let now_ns = start_ns;
        let stats = if plan.actions.is_empty() {
            PoolStats::default()
        } else {
            let ids: Vec<LedgerId> = plan.actions.iter().map(|_| LedgerId::new(uuid::Uuid::new_v4().to_string())).collect();

            let rows: Vec<LedgerRow> = plan
                .actions
                .iter()
                .enumerate()
                .map(|(i, action)| {
                    let depends_on = plan.deps[i].iter().map(|&d| ids[d].clone()).collect();
                    LedgerRow::from_action(ids[i].clone(), plan.cycle_id.clone(), action, depends_on)
                })
                .collect();
            self.store.write_actions(plan.cycle_id.clone(), rows)?;

            let tracker = Arc::new(DependencyTracker::new());
            for (i, action) in plan.actions.into_iter().enumerate() {
                let depends_on: Vec<LedgerId> = plan.deps[i].iter().map(|&d| ids[d].clone()).collect();
                tracker.add(action, ids[i].clone(), depends_on, plan.cycle_id.clone());
            }

            let failures = Arc::new(FailureTracker::new(3, 60 * 1_000_000_000));
            let pool = WorkerPool::spawn(
                tracker.clone(),
                self.store.clone(),
                self.executor.clone(),
                failures,
                self.clock.clone(),
                self.worker_count(),
            );

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tracker.done() => {}
            }
            pool.join().await;
            pool.stats()
        };

        if stats.failed == 0 {
            if let Some(token) = self.remote.current_delta_token() {
                self.store.commit_delta_token(self.drive_id.clone(), token)?;
            }
        }

        let retention_ns = self.config.tombstone_retention_days as i64 * 86_400 * 1_000_000_000;
        if let Err(e) = self.store.sweep_tombstones(now_ns, retention_ns) {
            tracing::warn!(error = %e, "tombstone sweep failed");
        }
        self.store.checkpoint()?;

        let mut summary: RunSummary = stats.into();
        let elapsed = (self.clock.now_ns() - start_ns).max(0) as u64;
        summary.duration = Duration::from_nanos(elapsed);
        Ok(summary)
    }

    /// Run exactly one full cycle: scan both sides, plan, execute, commit.
    pub async fn run_once(&self, opts: RunOnceOptions) -> Result<RunSummary, EngineError> {
        let changes = self.observe_once(opts.mode).await?;
        let known_items = self.store.read().entries_for_drive(&self.drive_id).count();
        let cycle_id = CycleId::new(uuid::Uuid::new_v4().to_string());
        let plan = planner::plan(
            &self.drive_id,
            &changes,
            &self.store.read(),
            known_items,
            self.thresholds(opts.force),
            cycle_id,
        )?;
        self.dispatch_plan(plan, CancellationToken::new(), opts.dry_run).await
    }

    /// Runs continuously: both observers feed a shared channel of
    /// [`ChangeEvent`] batches, each of which is planned and dispatched as
    /// its own cycle, until `cancel` fires.
    pub async fn run_watch(&self, cancel: CancellationToken) -> Result<RunSummary, EngineError> {
        let (tx, mut rx) = mpsc::channel::<Vec<ChangeEvent>>(256);

        let remote_fut = self.remote.watch(
            self.remote.current_delta_token(),
            tx.clone(),
            Duration::from_millis(self.config.watch.poll_interval_ms),
            cancel.clone(),
        );
        let local_fut = self.local.watch(
            tx,
            Duration::from_millis(self.config.watch.debounce_ms),
            Duration::from_millis(self.config.watch.write_coalesce_cooldown_ms),
            Duration::from_millis(self.config.watch.safety_scan_interval_ms),
            cancel.clone(),
        );

        let dispatch_fut = async {
            let buffer = EventBuffer::new();
            let mut total = RunSummary::default();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    batch = rx.recv() => {
                        let Some(batch) = batch else { break };
                        for event in batch {
                            buffer.add(event);
                        }
                        let changes = buffer.flush_immediate();
                        if changes.is_empty() {
                            continue;
                        }
                        let known_items = self.store.read().entries_for_drive(&self.drive_id).count();
                        let cycle_id = CycleId::new(uuid::Uuid::new_v4().to_string());
                        let plan = planner::plan(&self.drive_id, &changes, &self.store.read(), known_items, self.thresholds(false), cycle_id)?;
                        let summary = self.dispatch_plan(plan, cancel.clone(), false).await?;
                        total.accumulate(summary);
                    }
                }
            }
            Ok::<RunSummary, EngineError>(total)
        };

        let (remote_res, local_res, dispatch_res) = tokio::join!(remote_fut, local_fut, dispatch_fut);
        remote_res?;
        local_res?;
        dispatch_res
    }

    /// Record a human's resolution of an open conflict (§4.10). Actually
    /// applying the chosen side back onto disk/remote happens through the
    /// normal planner: once the conflict's ledger row and baseline entry
    /// reflect this resolution, the next cycle plans the corresponding
    /// upload/download/cleanup.
    pub fn resolve_conflict(&self, id: ConflictId, resolution: String) -> Result<(), EngineError> {
        self.store.resolve_conflict(id, resolution).map_err(Into::into)
    }
}
