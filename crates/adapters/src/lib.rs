// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: the real and fake implementations of the
//! capability traits the sync engine is generic over.

pub mod hash;
pub mod local;
pub mod remote;
pub mod watch;

pub use hash::{hash_file, sha256_hex};
pub use local::{DirEntryInfo, FsStat, LocalFs, LocalFsError, RealLocalFs};
pub use remote::{
    DeltaApi, DeltaPage, DownloadApi, HttpRemoteApi, ItemApi, RemoteApi, RemoteError, RemoteItem,
    UploadApi,
};
pub use watch::{FsWatcher, RawFsEvent, RawFsEventKind};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use remote::{FakeRemoteApi, RemoteCall};
