// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The remote drive's capability surface, split into one `async_trait` per
//! concern (delta fetcher, item metadata/folder/move/delete, download,
//! upload) so a production HTTP client and an in-memory test fake both
//! satisfy the same interface.
//!
//! Transport details (HTTP, OAuth, pagination wire format) are deliberately
//! not specified here — only the abstract operations the engine consumes.

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRemoteApi, RemoteCall};

pub mod http;
pub use http::HttpRemoteApi;

use async_trait::async_trait;
use odsync_core::{ItemId, ItemType};
use thiserror::Error;

/// Errors from remote operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    /// The server signaled that the delta token is no longer valid; the
    /// caller must retry once with an empty token (full resync).
    #[error("delta token expired")]
    DeltaExpired,
    /// The server reports an unknown resumable-upload session url.
    #[error("upload session expired: {0}")]
    SessionExpired(String),
    #[error("{0}")]
    Other(String),
}

/// One item as reported by the remote delta stream or item metadata calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub item_id: ItemId,
    pub parent_id: Option<ItemId>,
    /// Full path relative to the drive's sync root, forward-slash separated.
    pub path: String,
    pub name: String,
    pub item_type: ItemType,
    pub size: u64,
    pub hash: Option<String>,
    pub mtime_ns: i64,
    pub deleted: bool,
}

/// One page of the delta stream.
///
/// `next_link` is set when more pages remain for the *current* sync pass;
/// `delta_link` is the continuation token to save for the *next* cycle, set
/// only on the final page.
#[derive(Debug, Clone, Default)]
pub struct DeltaPage {
    pub items: Vec<RemoteItem>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
}

/// Streams remote changes from a pageable delta endpoint.
#[async_trait]
pub trait DeltaApi: Clone + Send + Sync + 'static {
    /// Fetch one page given either a saved `delta_link` (start of a new
    /// cycle) or a `next_link` (mid-pagination). `None` requests a full
    /// resync from the beginning.
    async fn fetch_delta(&self, token: Option<&str>) -> Result<DeltaPage, RemoteError>;
}

/// Item metadata, folder, move, and delete operations.
#[async_trait]
pub trait ItemApi: Clone + Send + Sync + 'static {
    async fn get_item(&self, item_id: &ItemId) -> Result<RemoteItem, RemoteError>;

    async fn list_children(&self, item_id: &ItemId) -> Result<Vec<RemoteItem>, RemoteError>;

    /// Idempotent by `(parent_id, name)`: a folder already present with the
    /// same name under the same parent is returned rather than duplicated.
    async fn create_folder(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
    ) -> Result<RemoteItem, RemoteError>;

    /// Rename and/or reparent an item.
    async fn move_item(
        &self,
        item_id: &ItemId,
        new_parent_id: Option<&ItemId>,
        new_name: &str,
    ) -> Result<RemoteItem, RemoteError>;

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), RemoteError>;
}

/// Whole-file content download.
#[async_trait]
pub trait DownloadApi: Clone + Send + Sync + 'static {
    async fn download(&self, item_id: &ItemId) -> Result<Vec<u8>, RemoteError>;
}

/// Simple (single-request) and resumable (chunked session) upload.
#[async_trait]
pub trait UploadApi: Clone + Send + Sync + 'static {
    async fn upload_simple(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<RemoteItem, RemoteError>;

    /// Begin a resumable upload session, returning its session url.
    async fn create_session(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
        total_size: u64,
    ) -> Result<String, RemoteError>;

    /// Upload one byte-range chunk. Returns `Some(item)` once the final
    /// chunk completes the upload, `None` otherwise.
    async fn upload_chunk(
        &self,
        session_url: &str,
        offset: u64,
        bytes: &[u8],
        total_size: u64,
    ) -> Result<Option<RemoteItem>, RemoteError>;
}

/// The full remote capability set. Blanket-implemented for any type
/// satisfying all four concerns, matching the teacher's single-adapter
/// traits (`AgentAdapter`, `SessionAdapter`) while keeping each concern
/// independently mockable.
pub trait RemoteApi: DeltaApi + ItemApi + DownloadApi + UploadApi {}

impl<T> RemoteApi for T where T: DeltaApi + ItemApi + DownloadApi + UploadApi {}
