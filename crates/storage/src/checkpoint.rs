// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background checkpointing with zstd compression and durable fsync.
//!
//! The checkpointer runs I/O off the main thread while ensuring durability
//! guarantees for crash recovery. The key invariant: snapshot must be durable
//! (including directory fsync) before WAL truncation.
//!
//! ## Design
//!
//! ```text
//! Main Thread                    Background Thread
//! ───────────────────────────    ─────────────────────────────
//! clone state (~10ms)
//!   │
//!   └─────────────────────────→  serialize + compress (~130ms)
//!                                write to .tmp (~20ms)
//!                                fsync .tmp (~50ms)
//!                                rename → snapshot (~1ms)
//!                                fsync directory (~30ms)
//!                                  │
//!   ←────────────────────────────┘ (completion signal)
//! truncate WAL (safe now)
//! ```
//!
//! ## Testability
//!
//! The `CheckpointWriter` trait abstracts all I/O operations, enabling:
//! - Deterministic unit tests with `FakeCheckpointWriter`
//! - Error injection for crash scenario testing
//! - Verification of fsync ordering guarantees

use crate::migration::MigrationRegistry;
use crate::snapshot::SnapshotError;
use crate::{MaterializedBaseline, Snapshot, CURRENT_SNAPSHOT_VERSION};
use chrono::Utc;
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors from checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compress(String),
    #[error("checkpoint in progress")]
    InProgress,
    #[error("checkpoint failed: {0}")]
    Failed(String),
}

/// Result of a completed checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointResult {
    /// Sequence number that was checkpointed
    pub seq: u64,
    /// Size of the compressed snapshot in bytes
    pub size_bytes: u64,
}

/// Trait abstracting checkpoint I/O for testability.
///
/// All file operations go through this trait, enabling fake implementations
/// for deterministic testing of checkpoint logic and crash scenarios.
pub trait CheckpointWriter: Send + Sync + 'static {
    /// Write compressed snapshot data to a temporary file.
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError>;

    /// Fsync a file to ensure data is durable.
    fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError>;

    /// Atomically rename tmp file to final path.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError>;

    /// Fsync directory to make rename durable.
    fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError>;

    /// Get file size (for metrics).
    fn file_size(&self, path: &Path) -> Result<u64, CheckpointError>;
}

/// Production checkpoint writer using real filesystem operations.
#[derive(Clone)]
pub struct FsCheckpointWriter;

impl CheckpointWriter for FsCheckpointWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(data)?;
        Ok(())
    }

    fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError> {
        let file = File::open(path)?;
        file.sync_all()?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError> {
        let dir = File::open(path)?;
        dir.sync_all()?;
        Ok(())
    }

    fn file_size(&self, path: &Path) -> Result<u64, CheckpointError> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Handle to a running checkpoint operation.
///
/// The checkpoint runs in a background thread. Call `wait()` to block until
/// completion, which must happen before WAL truncation.
pub struct CheckpointHandle {
    /// Sequence number being checkpointed
    pub seq: u64,
    receiver: mpsc::Receiver<Result<CheckpointResult, CheckpointError>>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl CheckpointHandle {
    /// Wait for the checkpoint to complete.
    ///
    /// This blocks until the snapshot is fully durable (including directory fsync).
    /// Only after this returns successfully is it safe to truncate the WAL.
    pub fn wait(self) -> Result<CheckpointResult, CheckpointError> {
        self.receiver
            .recv()
            .map_err(|_| CheckpointError::Failed("checkpoint thread panicked".into()))?
    }

    /// Check if checkpoint is complete without blocking.
    pub fn try_wait(&self) -> Option<Result<CheckpointResult, CheckpointError>> {
        self.receiver.try_recv().ok()
    }
}

/// Checkpointer manages background snapshot operations.
///
/// Only one checkpoint can run at a time. Starting a new checkpoint while
/// one is in progress returns an error.
pub struct Checkpointer<W: CheckpointWriter = FsCheckpointWriter> {
    writer: W,
    snapshot_path: PathBuf,
    compression_level: i32,
}

impl Checkpointer<FsCheckpointWriter> {
    /// Create a new checkpointer with default filesystem writer.
    pub fn new(snapshot_path: PathBuf) -> Self {
        Self::with_writer(FsCheckpointWriter, snapshot_path)
    }
}

impl<W: CheckpointWriter + Clone> Checkpointer<W> {
    /// Create a checkpointer with a custom writer (for testing).
    pub fn with_writer(writer: W, snapshot_path: PathBuf) -> Self {
        Self {
            writer,
            snapshot_path,
            // zstd level 3 is a good balance of speed and compression
            compression_level: 3,
        }
    }

    /// Set the zstd compression level (1-22, default 3).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Start a background checkpoint.
    ///
    /// This clones the state and spawns a thread to serialize, compress, and
    /// write the snapshot. The returned handle must be waited on before
    /// truncating the WAL.
    pub fn start(&self, seq: u64, state: &MaterializedBaseline) -> CheckpointHandle {
        let state_clone = state.clone();
        let writer = self.writer.clone();
        let snapshot_path = self.snapshot_path.clone();
        let compression_level = self.compression_level;

        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = checkpoint_blocking(
                &writer,
                seq,
                &state_clone,
                &snapshot_path,
                compression_level,
            );
            let _ = tx.send(result);
        });

        CheckpointHandle {
            seq,
            receiver: rx,
            handle,
        }
    }

    /// Perform a synchronous checkpoint (for shutdown).
    pub fn checkpoint_sync(
        &self,
        seq: u64,
        state: &MaterializedBaseline,
    ) -> Result<CheckpointResult, CheckpointError> {
        checkpoint_blocking(
            &self.writer,
            seq,
            state,
            &self.snapshot_path,
            self.compression_level,
        )
    }
}

/// Perform checkpoint I/O (runs on background thread).
fn checkpoint_blocking<W: CheckpointWriter>(
    writer: &W,
    seq: u64,
    state: &MaterializedBaseline,
    snapshot_path: &Path,
    compression_level: i32,
) -> Result<CheckpointResult, CheckpointError> {
    let tmp_path = snapshot_path.with_extension("tmp");

    let snapshot = Snapshot {
        version: CURRENT_SNAPSHOT_VERSION,
        seq,
        state: state.clone(),
        created_at: Utc::now(),
    };

    let json_bytes = serde_json::to_vec(&snapshot)?;

    let compressed = zstd::encode_all(json_bytes.as_slice(), compression_level)
        .map_err(|e| CheckpointError::Compress(e.to_string()))?;

    writer.write_tmp(&tmp_path, &compressed)?;
    writer.fsync_file(&tmp_path)?;
    writer.rename(&tmp_path, snapshot_path)?;

    // CRITICAL for WAL truncation safety: the rename must be durable.
    if let Some(parent) = snapshot_path.parent() {
        writer.fsync_dir(parent)?;
    }

    let size_bytes = writer
        .file_size(snapshot_path)
        .unwrap_or(compressed.len() as u64);

    Ok(CheckpointResult { seq, size_bytes })
}

/// Load a zstd-compressed snapshot, migrating forward if its schema is old.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let decoder = zstd::stream::read::Decoder::new(file)
        .map_err(|e| SnapshotError::Io(std::io::Error::other(e.to_string())))?;
    let value: Value = serde_json::from_reader(decoder)?;

    let registry = MigrationRegistry::new();
    let migrated = registry.migrate_to(value, CURRENT_SNAPSHOT_VERSION)?;
    let snapshot: Snapshot = serde_json::from_value(migrated)?;
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Debug, Clone, Default)]
    struct IoLog {
        writes: Vec<(PathBuf, usize)>,
        fsyncs_file: Vec<PathBuf>,
        fsyncs_dir: Vec<PathBuf>,
        renames: Vec<(PathBuf, PathBuf)>,
    }

    #[derive(Clone)]
    struct FakeCheckpointWriter {
        log: Arc<Mutex<IoLog>>,
        written_data: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
        fail_write: Arc<AtomicBool>,
        fail_fsync_file: Arc<AtomicBool>,
        fail_fsync_dir: Arc<AtomicBool>,
        fsync_file_count: Arc<AtomicU32>,
        fsync_dir_count: Arc<AtomicU32>,
    }

    impl FakeCheckpointWriter {
        fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(IoLog::default())),
                written_data: Arc::new(Mutex::new(HashMap::new())),
                fail_write: Arc::new(AtomicBool::new(false)),
                fail_fsync_file: Arc::new(AtomicBool::new(false)),
                fail_fsync_dir: Arc::new(AtomicBool::new(false)),
                fsync_file_count: Arc::new(AtomicU32::new(0)),
                fsync_dir_count: Arc::new(AtomicU32::new(0)),
            }
        }

        fn set_fail_write(&self, fail: bool) {
            self.fail_write.store(fail, Ordering::SeqCst);
        }

        fn set_fail_fsync_dir(&self, fail: bool) {
            self.fail_fsync_dir.store(fail, Ordering::SeqCst);
        }

        fn log(&self) -> IoLog {
            self.log.lock().unwrap().clone()
        }

        fn get_written_data(&self, path: &Path) -> Option<Vec<u8>> {
            self.written_data.lock().unwrap().get(path).cloned()
        }
    }

    impl CheckpointWriter for FakeCheckpointWriter {
        fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
            if self.fail_write.load(Ordering::SeqCst) {
                return Err(CheckpointError::Io(std::io::Error::other(
                    "injected write failure",
                )));
            }
            self.log
                .lock()
                .unwrap()
                .writes
                .push((path.to_owned(), data.len()));
            self.written_data
                .lock()
                .unwrap()
                .insert(path.to_owned(), data.to_vec());
            Ok(())
        }

        fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError> {
            if self.fail_fsync_file.load(Ordering::SeqCst) {
                return Err(CheckpointError::Io(std::io::Error::other(
                    "injected fsync failure",
                )));
            }
            self.fsync_file_count.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().fsyncs_file.push(path.to_owned());
            Ok(())
        }

        fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError> {
            let data = self.written_data.lock().unwrap().remove(from);
            if let Some(d) = data {
                self.written_data.lock().unwrap().insert(to.to_owned(), d);
            }
            self.log
                .lock()
                .unwrap()
                .renames
                .push((from.to_owned(), to.to_owned()));
            Ok(())
        }

        fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError> {
            if self.fail_fsync_dir.load(Ordering::SeqCst) {
                return Err(CheckpointError::Io(std::io::Error::other(
                    "injected fsync_dir failure",
                )));
            }
            self.fsync_dir_count.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().fsyncs_dir.push(path.to_owned());
            Ok(())
        }

        fn file_size(&self, path: &Path) -> Result<u64, CheckpointError> {
            let data = self.written_data.lock().unwrap();
            Ok(data.get(path).map(|d| d.len() as u64).unwrap_or(0))
        }
    }

    fn empty_state() -> MaterializedBaseline {
        MaterializedBaseline::default()
    }

    #[test]
    fn checkpoint_writes_fsyncs_and_renames_in_order() {
        let writer = FakeCheckpointWriter::new();
        let checkpointer =
            Checkpointer::with_writer(writer.clone(), PathBuf::from("/data/snapshot.bin"));

        let handle = checkpointer.start(42, &empty_state());
        let result = handle.wait().unwrap();

        assert_eq!(result.seq, 42);
        assert!(result.size_bytes > 0);

        let log = writer.log();
        assert_eq!(log.writes.len(), 1);
        assert_eq!(log.fsyncs_file.len(), 1);
        assert_eq!(log.renames.len(), 1);
        assert_eq!(log.fsyncs_dir.len(), 1);
        assert!(log.writes[0].0.to_string_lossy().contains(".tmp"));
        assert_eq!(log.renames[0].1, PathBuf::from("/data/snapshot.bin"));
        assert_eq!(log.fsyncs_dir[0], PathBuf::from("/data"));
    }

    #[test]
    fn checkpoint_produces_zstd_compressed_output() {
        let writer = FakeCheckpointWriter::new();
        let snapshot_path = PathBuf::from("/data/snapshot.bin");
        let checkpointer = Checkpointer::with_writer(writer.clone(), snapshot_path.clone());

        let handle = checkpointer.start(1, &empty_state());
        handle.wait().unwrap();

        let data = writer.get_written_data(&snapshot_path).unwrap();
        assert_eq!(&data[0..4], &[0x28, 0xB5, 0x2F, 0xFD]);

        let decompressed = zstd::decode_all(data.as_slice()).unwrap();
        let snapshot: Snapshot = serde_json::from_slice(&decompressed).unwrap();
        assert_eq!(snapshot.seq, 1);
        assert_eq!(snapshot.version, CURRENT_SNAPSHOT_VERSION);
    }

    #[test]
    fn checkpoint_error_on_write_failure_propagates() {
        let writer = FakeCheckpointWriter::new();
        writer.set_fail_write(true);
        let checkpointer = Checkpointer::with_writer(writer, PathBuf::from("/data/snapshot.bin"));

        let handle = checkpointer.start(1, &empty_state());
        let err = handle.wait().unwrap_err();
        assert!(matches!(err, CheckpointError::Io(_)));
    }

    #[test]
    fn checkpoint_error_on_dir_fsync_failure_propagates() {
        let writer = FakeCheckpointWriter::new();
        writer.set_fail_fsync_dir(true);
        let checkpointer = Checkpointer::with_writer(writer, PathBuf::from("/data/snapshot.bin"));

        let handle = checkpointer.start(1, &empty_state());
        assert!(handle.wait().is_err(), "dir fsync failure must surface");
    }

    #[test]
    fn checkpoint_sync_blocks_until_durable() {
        let writer = FakeCheckpointWriter::new();
        let checkpointer =
            Checkpointer::with_writer(writer.clone(), PathBuf::from("/data/snapshot.bin"));

        let result = checkpointer.checkpoint_sync(99, &empty_state()).unwrap();
        assert_eq!(result.seq, 99);
        assert_eq!(writer.fsync_file_count(), 1);
        assert_eq!(writer.fsync_dir_count(), 1);
    }

    #[test]
    fn round_trips_through_real_filesystem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.bin");

        let checkpointer = Checkpointer::new(path.clone());
        checkpointer.checkpoint_sync(42, &empty_state()).unwrap();

        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.seq, 42);
        assert_eq!(loaded.version, CURRENT_SNAPSHOT_VERSION);
    }

    #[test]
    fn load_nonexistent_snapshot_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        assert!(load_snapshot(&path).unwrap().is_none());
    }

    #[test]
    fn load_snapshot_newer_than_supported_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.bin");

        let snapshot_json = r#"{"v":99,"seq":1,"state":{},"created_at":"2025-01-01T00:00:00Z"}"#;
        let compressed = zstd::encode_all(snapshot_json.as_bytes(), 3).unwrap();
        std::fs::write(&path, &compressed).unwrap();

        let err = load_snapshot(&path).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Migration(crate::migration::MigrationError::TooNew(99, _))
        ));
    }
}
