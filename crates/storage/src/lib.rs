// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable storage for odsync: write-ahead log, zstd snapshots, schema
//! migration, the materialized baseline, and the store that ties them
//! together into one crash-consistent writer.

mod checkpoint;
mod migration;
mod snapshot;
mod state;
mod store;
mod wal;

/// Bump whenever [`state::MaterializedBaseline`]'s on-disk shape changes
/// incompatibly; add a [`migration::Migration`] from the old version.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

pub use checkpoint::{
    CheckpointError, CheckpointHandle, CheckpointResult, CheckpointWriter, Checkpointer,
    FsCheckpointWriter,
};
pub use migration::{Migration, MigrationError, MigrationRegistry};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::MaterializedBaseline;
pub use store::{BaselineStore, StoreError};
pub use wal::{Wal, WalEntry, WalError};
