// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local filesystem capability trait + the real implementation.
//!
//! Engine-level tests exercise this against a real `tempfile` sync root
//! rather than a fake — unlike the remote side, there is no wire protocol
//! to mock, and atomic-rename semantics are exactly what needs exercising.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from local filesystem operations.
#[derive(Debug, Error)]
pub enum LocalFsError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("not found: {0}")]
    NotFound(PathBuf),
}

impl LocalFsError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// Metadata for one path, as observed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub size: u64,
    pub mtime_ns: i64,
    pub is_dir: bool,
}

/// One entry returned by [`LocalFs::read_dir`].
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Capability surface the local observer and executor need against the
/// sync root. Abstracted so the engine never calls `std::fs`/`tokio::fs`
/// directly, matching the remote side's capability-trait shape.
#[async_trait]
pub trait LocalFs: Clone + Send + Sync + 'static {
    /// `Ok(None)` if the path does not exist.
    async fn stat(&self, path: &Path) -> Result<Option<FsStat>, LocalFsError>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>, LocalFsError>;

    /// Write `bytes` to `path` atomically: write to a temp file in the same
    /// directory, fsync it, then rename into place. `mtime_ns`, if given,
    /// is applied to the final file.
    async fn write_atomic(
        &self,
        path: &Path,
        bytes: &[u8],
        mtime_ns: Option<i64>,
    ) -> Result<(), LocalFsError>;

    async fn create_dir_all(&self, path: &Path) -> Result<(), LocalFsError>;

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), LocalFsError>;

    async fn remove_file(&self, path: &Path) -> Result<(), LocalFsError>;

    /// Fails unless `path` is an empty directory — descendants are always
    /// planned as separate, dependency-ordered deletes.
    async fn remove_dir(&self, path: &Path) -> Result<(), LocalFsError>;

    /// List immediate children of a directory.
    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, LocalFsError>;

    /// Content fingerprint, computed on a blocking thread.
    async fn hash_file(&self, path: &Path) -> Result<String, LocalFsError>;
}

/// Real `tokio::fs`-backed implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealLocalFs;

impl RealLocalFs {
    pub fn new() -> Self {
        Self
    }
}

fn mtime_ns_of(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl LocalFs for RealLocalFs {
    async fn stat(&self, path: &Path) -> Result<Option<FsStat>, LocalFsError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(FsStat {
                size: meta.len(),
                mtime_ns: mtime_ns_of(&meta),
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LocalFsError::io(path, e)),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, LocalFsError> {
        tokio::fs::read(path).await.map_err(|e| LocalFsError::io(path, e))
    }

    async fn write_atomic(
        &self,
        path: &Path,
        bytes: &[u8],
        mtime_ns: Option<i64>,
    ) -> Result<(), LocalFsError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_name = format!(
            ".{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("odsync"),
            std::process::id()
        );
        let tmp_path = dir.join(tmp_name);

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| LocalFsError::io(&tmp_path, e))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, bytes)
            .await
            .map_err(|e| LocalFsError::io(&tmp_path, e))?;
        file.sync_all().await.map_err(|e| LocalFsError::io(&tmp_path, e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| LocalFsError::io(path, e))?;

        if let Some(mtime_ns) = mtime_ns {
            let mtime = std::time::UNIX_EPOCH + std::time::Duration::from_nanos(mtime_ns.max(0) as u64);
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || filetime_set_mtime(&path, mtime))
                .await
                .map_err(|e| LocalFsError::io(&path_unused(), io::Error::other(e)))??;
        }
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), LocalFsError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| LocalFsError::io(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), LocalFsError> {
        tokio::fs::rename(from, to).await.map_err(|e| LocalFsError::io(to, e))
    }

    async fn remove_file(&self, path: &Path) -> Result<(), LocalFsError> {
        tokio::fs::remove_file(path).await.map_err(|e| LocalFsError::io(path, e))
    }

    async fn remove_dir(&self, path: &Path) -> Result<(), LocalFsError> {
        tokio::fs::remove_dir(path).await.map_err(|e| LocalFsError::io(path, e))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, LocalFsError> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| LocalFsError::io(path, e))?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| LocalFsError::io(path, e))? {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| LocalFsError::io(&entry.path(), e))?
                .is_dir();
            out.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path(),
                is_dir,
            });
        }
        Ok(out)
    }

    async fn hash_file(&self, path: &Path) -> Result<String, LocalFsError> {
        crate::hash::hash_file(path)
            .await
            .map_err(|e| LocalFsError::io(path, e))
    }
}

// Placeholder path for an error branch that never carries a real path
// (the spawn_blocking join error has none of its own).
fn path_unused() -> PathBuf {
    PathBuf::new()
}

fn filetime_set_mtime(path: &Path, mtime: std::time::SystemTime) -> Result<(), LocalFsError> {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .map_err(|e| LocalFsError::io(path, e))?;
    file.set_modified(mtime).map_err(|e| LocalFsError::io(path, e))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
