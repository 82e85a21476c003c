// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-instance lock for one drive's sync process, so a crashed or
//! concurrently-started `odsyncd` can never race the baseline's single
//! writer. Grounded on the teacher daemon's `daemon.pid` lock file
//! lifecycle (`lifecycle.rs`): acquire-before-any-other-directory-write,
//! PID written only once the lock is held, lock released implicitly by
//! dropping the file handle.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another odsyncd instance already holds the lock at {0}")]
    AlreadyRunning(PathBuf),
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An exclusive, advisory lock on `state_dir/odsyncd.pid`. Held for the
/// lifetime of the process; the OS releases the lock and the `Drop` impl
/// removes the PID file when this value goes out of scope.
pub struct DaemonLock {
    path: PathBuf,
    // Held only to keep the `flock` alive; never read after acquisition.
    _file: File,
}

impl DaemonLock {
    pub fn acquire(state_dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join("odsyncd.pid");

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| LockError::AlreadyRunning(path.clone()))?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self { path, _file: file })
    }

    /// Best-effort read of the PID recorded by whoever currently holds (or
    /// last held) the lock at `state_dir`, for a friendly "already running"
    /// message when acquisition fails.
    pub fn running_pid(state_dir: &Path) -> Option<u32> {
        std::fs::read_to_string(state_dir.join("odsyncd.pid"))
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_in_same_dir_fails() {
        let dir = tempdir().unwrap();
        let first = DaemonLock::acquire(dir.path()).unwrap();
        let second = DaemonLock::acquire(dir.path());
        assert!(matches!(second, Err(LockError::AlreadyRunning(_))));
        drop(first);
    }

    #[test]
    fn lock_is_released_and_pid_file_removed_on_drop() {
        let dir = tempdir().unwrap();
        let lock = DaemonLock::acquire(dir.path()).unwrap();
        assert_eq!(DaemonLock::running_pid(dir.path()), Some(std::process::id()));
        drop(lock);
        assert!(!dir.path().join("odsyncd.pid").exists());

        // Acquiring again after the drop must succeed.
        let _relocked = DaemonLock::acquire(dir.path()).unwrap();
    }
}
