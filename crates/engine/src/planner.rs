// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transforms buffered per-path changes plus the current baseline into an
//! [`ActionPlan`] (§4.6): the decision matrix, big-delete safety gate, and
//! dependency-edge computation.

use crate::error::{core_err, EngineError};
use odsync_core::{
    path_util, Action, ActionType, BaselineEntry, ChangeEvent, ChangeKind, ConflictKind, CycleId,
    DriveId, ErrorKind, ItemType, PathChanges, PathView,
};
use odsync_storage::MaterializedBaseline;
use std::collections::HashMap;

/// Big-delete safety thresholds (§4.6, §6 `big_delete`).
#[derive(Debug, Clone, Copy)]
pub struct BigDeleteThresholds {
    pub min_items: u64,
    pub threshold_count: u64,
    pub threshold_percent: f64,
    pub force: bool,
}

/// Planner output: a dependency-ordered batch of actions for one cycle.
#[derive(Debug, Clone)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
    /// `deps[i]` mirrors `actions[i].deps` — indices into `actions` that
    /// must complete first.
    pub deps: Vec<Vec<usize>>,
    pub cycle_id: CycleId,
}

/// Presence of one side (remote or local) relative to the baseline, derived
/// from this cycle's observation (if any) and the baseline's change-tracking
/// helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    /// No baseline row yet, and this side reports the item present.
    New,
    /// Baseline row exists; this side's content diverges from the last
    /// synced state.
    Changed,
    /// Baseline row exists; this side matches the last synced state.
    Unchanged,
    /// This side reports the item gone; baseline row existed.
    Deleted,
    /// Neither a baseline row nor an observation this cycle — this side has
    /// never known the path.
    Absent,
}

fn presence(
    event: Option<&ChangeEvent>,
    has_baseline: bool,
    side_changed: bool,
    synced_hash: Option<&str>,
    synced_size: u64,
) -> Presence {
    match event {
        Some(e) if e.kind == ChangeKind::Delete => Presence::Deleted,
        Some(e) => {
            if !has_baseline {
                Presence::New
            } else {
                // A fresh observation this cycle is compared straight
                // against the last agreed state, not against the side's own
                // `remote_hash`/`local_hash` fields - those only move when
                // an executor handler calls `observe_remote`/`observe_local`
                // (upload, folder create, a keep_both copy), so leaning on
                // them here would miss ordinary edits full_scan/delta
                // report every cycle without ever writing them back.
                let diverges = match (e.hash.as_deref(), synced_hash) {
                    (Some(h), Some(s)) => h != s,
                    (Some(_), None) => true,
                    (None, _) => e.size.unwrap_or(synced_size) != synced_size,
                };
                if diverges {
                    Presence::Changed
                } else {
                    Presence::Unchanged
                }
            }
        }
        None => {
            if !has_baseline {
                Presence::Absent
            } else if side_changed {
                // No fresh observation this cycle, but the baseline already
                // diverges from the last synced state (e.g. a prior cycle
                // left this side's hash unreconciled) - don't let silence
                // this cycle paper over that.
                Presence::Changed
            } else {
                Presence::Unchanged
            }
        }
    }
}

fn fingerprint(event: Option<&ChangeEvent>, baseline_hash: Option<&str>, baseline_size: u64) -> (Option<String>, u64) {
    match event {
        Some(e) => (e.hash.clone(), e.size.unwrap_or(baseline_size)),
        None => (baseline_hash.map(str::to_string), baseline_size),
    }
}

fn fingerprints_match(local: &(Option<String>, u64), remote: &(Option<String>, u64)) -> bool {
    match (&local.0, &remote.0) {
        (Some(l), Some(r)) => l == r,
        _ => local.1 == remote.1,
    }
}

fn item_type_of(local: Option<&ChangeEvent>, remote: Option<&ChangeEvent>, baseline: Option<&BaselineEntry>) -> ItemType {
    local
        .map(|e| e.item_type)
        .or_else(|| remote.map(|e| e.item_type))
        .or_else(|| baseline.map(|b| b.item_type))
        .unwrap_or(ItemType::File)
}

/// One path's classification before dependency wiring.
struct Classified {
    path: String,
    action_type: ActionType,
    view: PathView,
}

fn classify_path(change: &PathChanges, baseline: Option<&BaselineEntry>) -> Option<Classified> {
    // A baseline row exists as soon as either side is first observed (see
    // `MaterializedBaseline::entry_or_insert`), so "no baseline" in the
    // decision matrix means "never synced", not "no row yet".
    let has_baseline = baseline.is_some_and(BaselineEntry::has_synced_state);
    let remote_changed = baseline.is_some_and(|b| b.remote_changed());
    let local_changed = baseline.is_some_and(|b| b.local_changed());

    let synced_hash = baseline.and_then(|b| b.synced_hash.as_deref());
    let synced_size = baseline.map(|b| b.synced_size).unwrap_or(0);
    let remote_presence = presence(change.remote.as_ref(), has_baseline, remote_changed, synced_hash, synced_size);
    let local_presence = presence(change.local.as_ref(), has_baseline, local_changed, synced_hash, synced_size);

    if remote_presence == Presence::Absent && local_presence == Presence::Absent {
        return None;
    }

    let view = PathView {
        local: change.local.clone(),
        remote: change.remote.clone(),
        baseline: baseline.cloned(),
    };

    let is_folder = item_type_of(change.local.as_ref(), change.remote.as_ref(), baseline) == ItemType::Folder;

    let local_fp = fingerprint(
        change.local.as_ref(),
        baseline.and_then(|b| b.local_hash.as_deref()),
        baseline.map(|b| b.local_size).unwrap_or(0),
    );
    let remote_fp = fingerprint(
        change.remote.as_ref(),
        baseline.and_then(|b| b.remote_hash.as_deref()),
        baseline.map(|b| b.size).unwrap_or(0),
    );

    use Presence::*;
    let action_type = match (remote_presence, local_presence) {
        (New, Absent) if !has_baseline => {
            if is_folder {
                ActionType::FolderCreate
            } else {
                ActionType::Download
            }
        }
        (Absent, New) if !has_baseline => {
            if is_folder {
                ActionType::FolderCreate
            } else {
                ActionType::Upload
            }
        }
        (New, New) if !has_baseline => {
            if fingerprints_match(&local_fp, &remote_fp) {
                ActionType::UpdateSynced
            } else {
                ActionType::Conflict { kind: ConflictKind::KeepBoth }
            }
        }
        (Changed, Unchanged) if has_baseline => ActionType::Download,
        (Unchanged, Changed) if has_baseline => ActionType::Upload,
        (Changed, Changed) if has_baseline => {
            if fingerprints_match(&local_fp, &remote_fp) {
                ActionType::UpdateSynced
            } else {
                ActionType::Conflict { kind: ConflictKind::KeepBoth }
            }
        }
        (Deleted, Unchanged) if has_baseline => ActionType::LocalDelete,
        (Unchanged, Deleted) if has_baseline => ActionType::RemoteDelete,
        (Deleted, Deleted) if has_baseline => ActionType::Cleanup,
        (Deleted, Changed) if has_baseline => ActionType::Conflict { kind: ConflictKind::KeepLocal },
        (Changed, Deleted) if has_baseline => ActionType::Conflict { kind: ConflictKind::KeepRemote },
        // Both sides still agree with baseline - nothing to do this cycle.
        (Unchanged, Unchanged) => return None,
        _ => return None,
    };

    Some(Classified {
        path: change.path.clone(),
        action_type,
        view,
    })
}

/// Best-effort move detection: a file deleted on one side whose content
/// reappears at a brand-new path on the same side within the same batch is
/// folded into a single move action instead of an independent delete +
/// create pair.
///
/// `ActionType::LocalMove`/`RemoteMove` name the side the *effect* lands on,
/// not the side that originated the change (see executor.rs): a `LocalMove`
/// renames the local file to mirror a remote-originated move, a
/// `RemoteMove` PATCHes the remote item to mirror a local-originated one.
/// So `RemoteDelete` (local-driven: remote unchanged, local gone) pairs
/// with a local-driven `Upload` create into a `RemoteMove`; `LocalDelete`
/// (remote-driven) pairs with a remote-driven `Download` create into a
/// `LocalMove`.
///
/// The remote-driven pairing matches by `item_id`: the delta stream reports
/// the same item at both the old and new path, so the baseline's recorded
/// item id for the deleted path and the create's `ChangeEvent::item_id`
/// identify the same move unambiguously. The local-driven pairing has no
/// such identity to lean on - the filesystem doesn't hand out stable ids -
/// so it falls back to `(hash, size)` co-occurrence, which misses moves
/// where content also changed (see DESIGN.md).
fn detect_moves(classified: &mut Vec<Classified>) {
    let deletes: Vec<(usize, bool, Option<String>, u64, Option<odsync_core::ItemId>)> = classified
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match &c.action_type {
            ActionType::RemoteDelete => Some((
                i,
                true,
                c.view.baseline.as_ref().and_then(|b| b.local_hash.clone()),
                c.view.baseline.as_ref().map(|b| b.local_size).unwrap_or(0),
                None,
            )),
            ActionType::LocalDelete => Some((
                i,
                false,
                c.view.baseline.as_ref().and_then(|b| b.remote_hash.clone()),
                c.view.baseline.as_ref().map(|b| b.size).unwrap_or(0),
                c.view.baseline.as_ref().map(|b| b.item_id.clone()),
            )),
            _ => None,
        })
        .collect();

    if deletes.is_empty() {
        return;
    }

    let mut consumed = vec![false; classified.len()];
    for (delete_idx, is_local_driven, hash, size, item_id) in deletes {
        if hash.is_none() && item_id.is_none() {
            continue;
        }
        let create_idx = classified.iter().enumerate().position(|(i, c)| {
            if consumed[i] || i == delete_idx {
                return false;
            }
            if is_local_driven {
                hash.is_some()
                    && matches!(c.action_type, ActionType::Upload)
                    && c.view.local.as_ref().and_then(|e| e.hash.clone()) == hash
                    && c.view.local.as_ref().and_then(|e| e.size) == Some(size)
            } else if !matches!(c.action_type, ActionType::Download) {
                false
            } else {
                let candidate_item_id = c.view.remote.as_ref().and_then(|e| e.item_id.as_ref());
                match (&item_id, candidate_item_id) {
                    // Both sides carry the delta stream's stable id: the
                    // unambiguous case, independent of content fingerprint.
                    (Some(a), Some(b)) => a == b,
                    _ => {
                        hash.is_some()
                            && c.view.remote.as_ref().and_then(|e| e.hash.clone()) == hash
                            && c.view.remote.as_ref().and_then(|e| e.size) == Some(size)
                    }
                }
            }
        });

        if let Some(create_idx) = create_idx {
            let old_path = classified[delete_idx].path.clone();
            let new_path = classified[create_idx].path.clone();
            classified[create_idx].action_type = if is_local_driven {
                ActionType::RemoteMove { old_path }
            } else {
                ActionType::LocalMove { old_path }
            };
            classified[create_idx].path = new_path;
            consumed[delete_idx] = true;
            consumed[create_idx] = true;
        }
    }

    let mut kept = Vec::with_capacity(classified.len());
    for (i, c) in classified.drain(..).enumerate() {
        if !consumed[i] {
            kept.push(c);
        }
    }
    *classified = kept;
}

fn wire_dependencies(actions: &mut [Action]) {
    let mut folder_create_idx: HashMap<String, usize> = HashMap::new();
    let mut freed_by: HashMap<String, usize> = HashMap::new();

    for (i, a) in actions.iter().enumerate() {
        match &a.action_type {
            ActionType::FolderCreate => {
                folder_create_idx.insert(a.path.clone(), i);
            }
            ActionType::LocalDelete | ActionType::RemoteDelete | ActionType::Cleanup => {
                freed_by.insert(a.path.clone(), i);
            }
            ActionType::LocalMove { old_path } | ActionType::RemoteMove { old_path } => {
                freed_by.insert(old_path.clone(), i);
            }
            _ => {}
        }
    }

    for i in 0..actions.len() {
        let path = actions[i].path.clone();
        let mut deps = Vec::new();
        let parent = path_util::parent_path(&path);
        if !parent.is_empty() {
            if let Some(&pi) = folder_create_idx.get(parent) {
                if pi != i {
                    deps.push(pi);
                }
            }
        }
        if let Some(&fi) = freed_by.get(&path) {
            if fi != i {
                deps.push(fi);
            }
        }
        actions[i].deps = deps;
    }
}

/// Build an [`ActionPlan`] from this cycle's buffered changes and the
/// current baseline. `known_items` is the drive's total baseline entry
/// count, used for the big-delete percentage gate.
pub fn plan(
    drive_id: &DriveId,
    changes: &[PathChanges],
    baseline: &MaterializedBaseline,
    known_items: usize,
    thresholds: BigDeleteThresholds,
    cycle_id: CycleId,
) -> Result<ActionPlan, EngineError> {
    let mut classified: Vec<Classified> = changes
        .iter()
        .filter_map(|c| classify_path(c, baseline.get(drive_id, &c.path)))
        .collect();

    detect_moves(&mut classified);

    let mut actions: Vec<Action> = classified
        .into_iter()
        .map(|c| {
            // A baseline row carries the authoritative item id once a path has
            // synced once; a path that hasn't (brand-new remote item, no
            // baseline yet) has no baseline to draw from, but the delta
            // stream's own `ChangeEvent::item_id` already names it.
            let item_id = c
                .view
                .baseline
                .as_ref()
                .map(|b| b.item_id.clone())
                .or_else(|| c.view.remote.as_ref().and_then(|e| e.item_id.clone()));
            let mut action = Action::new(c.action_type, c.path, drive_id.clone());
            action.item_id = item_id;
            action.view = c.view;
            action
        })
        .collect();

    let delete_count = actions
        .iter()
        .filter(|a| matches!(a.action_type, ActionType::LocalDelete | ActionType::RemoteDelete))
        .count() as u64;

    if !thresholds.force
        && delete_count >= thresholds.min_items
        && (delete_count >= thresholds.threshold_count
            || known_items > 0
                && (delete_count as f64 / known_items as f64) >= thresholds.threshold_percent)
    {
        return Err(core_err(
            ErrorKind::BigDeleteTriggered,
            format!("{delete_count} deletes proposed out of {known_items} known items"),
        ));
    }

    wire_dependencies(&mut actions);
    let deps = actions.iter().map(|a| a.deps.clone()).collect();

    Ok(ActionPlan { actions, deps, cycle_id })
}
