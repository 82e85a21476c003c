// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path normalization helpers.
//!
//! The baseline stores paths as Unicode NFC, forward-slash separated,
//! relative to the drive's sync root (§3 invariant 5). Conversion to the
//! platform path separator happens only at I/O boundaries.

use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Normalize a path string to the baseline's canonical form: NFC, `/`
/// separated, no leading or trailing slash.
pub fn normalize_path(raw: &str) -> String {
    let slashed = raw.replace('\\', "/");
    let nfc: String = slashed.nfc().collect();
    nfc.trim_matches('/').to_string()
}

/// Join a normalized baseline path onto a filesystem sync root, producing a
/// platform-native path.
pub fn to_fs_path(sync_root: &Path, baseline_path: &str) -> PathBuf {
    let mut out = sync_root.to_path_buf();
    for component in baseline_path.split('/').filter(|s| !s.is_empty()) {
        out.push(component);
    }
    out
}

/// Derive a baseline-relative path string for `abs_path` given its sync root.
///
/// Returns `None` if `abs_path` does not descend from `sync_root`.
pub fn from_fs_path(sync_root: &Path, abs_path: &Path) -> Option<String> {
    let rel = abs_path.strip_prefix(sync_root).ok()?;
    let s = rel.to_string_lossy();
    Some(normalize_path(&s))
}

/// The parent baseline path of `path`, or `""` for a root-level entry.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The final path component (file/folder name) of `path`.
pub fn leaf_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Rewrite `path` (and, transitively, any path nested under it) from
/// `old_prefix` to `new_prefix`. Used to rewrite descendant baseline entries
/// after a folder move/rename.
pub fn rewrite_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if path == old_prefix {
        return Some(new_prefix.to_string());
    }
    let nested = format!("{old_prefix}/");
    path.strip_prefix(&nested)
        .map(|rest| format!("{new_prefix}/{rest}"))
}
