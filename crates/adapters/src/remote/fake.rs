// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fake remote drive for engine-level tests.
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{DeltaApi, DeltaPage, DownloadApi, ItemApi, RemoteError, RemoteItem, UploadApi};
use crate::hash::sha256_hex;
use async_trait::async_trait;
use odsync_core::{ItemId, ItemType};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Recorded remote call, for assertions in tests that care about call
/// counts/arguments rather than just end state.
#[derive(Debug, Clone)]
pub enum RemoteCall {
    FetchDelta { token: Option<String> },
    GetItem { item_id: ItemId },
    ListChildren { item_id: ItemId },
    CreateFolder { parent_id: Option<ItemId>, name: String },
    MoveItem { item_id: ItemId, new_parent_id: Option<ItemId>, new_name: String },
    DeleteItem { item_id: ItemId },
    Download { item_id: ItemId },
    UploadSimple { parent_id: Option<ItemId>, name: String, len: usize },
    CreateSession { parent_id: Option<ItemId>, name: String, total_size: u64 },
    UploadChunk { session_url: String, offset: u64, len: usize },
}

struct UploadSession {
    parent_id: Option<ItemId>,
    name: String,
    buffer: Vec<u8>,
    total_size: u64,
}

struct FakeState {
    items: HashMap<ItemId, RemoteItem>,
    content: HashMap<ItemId, Vec<u8>>,
    queued_pages: VecDeque<DeltaPage>,
    expire_once: HashSet<String>,
    next_seq: u64,
    sessions: HashMap<String, UploadSession>,
    calls: Vec<RemoteCall>,
}

/// In-memory fake satisfying the full [`super::RemoteApi`] surface.
///
/// On the first `fetch_delta(None)` call with no pages queued, returns every
/// seeded item as a single page (simulating an initial full sync). Tests
/// that need incremental pages should use [`FakeRemoteApi::queue_delta_page`].
#[derive(Clone)]
pub struct FakeRemoteApi {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeRemoteApi {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                items: HashMap::new(),
                content: HashMap::new(),
                queued_pages: VecDeque::new(),
                expire_once: HashSet::new(),
                next_seq: 0,
                sessions: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }
}

impl FakeRemoteApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a remote item (and, for files, its content) as already present
    /// on the server before the first sync.
    pub fn seed_item(&self, item: RemoteItem, content: Option<Vec<u8>>) {
        let mut inner = self.inner.lock();
        if let Some(bytes) = content {
            inner.content.insert(item.item_id.clone(), bytes);
        }
        inner.items.insert(item.item_id.clone(), item);
    }

    /// Queue an explicit delta page to be returned by the next
    /// `fetch_delta` call, in FIFO order.
    pub fn queue_delta_page(&self, page: DeltaPage) {
        self.inner.lock().queued_pages.push_back(page);
    }

    /// Make the next `fetch_delta` call using this exact token fail with
    /// [`RemoteError::DeltaExpired`], once.
    pub fn expire_token(&self, token: impl Into<String>) {
        self.inner.lock().expire_once.insert(token.into());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    pub fn item(&self, item_id: &ItemId) -> Option<RemoteItem> {
        self.inner.lock().items.get(item_id).cloned()
    }

    pub fn content(&self, item_id: &ItemId) -> Option<Vec<u8>> {
        self.inner.lock().content.get(item_id).cloned()
    }

    fn next_item_id(inner: &mut FakeState) -> ItemId {
        inner.next_seq += 1;
        ItemId::new(format!("fake-item-{}", inner.next_seq))
    }
}

#[async_trait]
impl DeltaApi for FakeRemoteApi {
    async fn fetch_delta(&self, token: Option<&str>) -> Result<DeltaPage, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::FetchDelta { token: token.map(String::from) });

        if let Some(t) = token {
            if inner.expire_once.remove(t) {
                return Err(RemoteError::DeltaExpired);
            }
        }

        if let Some(page) = inner.queued_pages.pop_front() {
            return Ok(page);
        }

        if token.is_none() {
            let items: Vec<RemoteItem> = inner.items.values().cloned().collect();
            return Ok(DeltaPage {
                items,
                next_link: None,
                delta_link: Some("v1".to_string()),
            });
        }

        Ok(DeltaPage {
            items: Vec::new(),
            next_link: None,
            delta_link: token.map(String::from),
        })
    }
}

#[async_trait]
impl ItemApi for FakeRemoteApi {
    async fn get_item(&self, item_id: &ItemId) -> Result<RemoteItem, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::GetItem { item_id: item_id.clone() });
        inner
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))
    }

    async fn list_children(&self, item_id: &ItemId) -> Result<Vec<RemoteItem>, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::ListChildren { item_id: item_id.clone() });
        Ok(inner
            .items
            .values()
            .filter(|i| i.parent_id.as_ref() == Some(item_id))
            .cloned()
            .collect())
    }

    async fn create_folder(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
    ) -> Result<RemoteItem, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::CreateFolder {
            parent_id: parent_id.cloned(),
            name: name.to_string(),
        });

        if let Some(existing) = inner.items.values().find(|i| {
            i.parent_id.as_ref() == parent_id && i.name == name && i.item_type == ItemType::Folder
        }) {
            return Ok(existing.clone());
        }

        let item_id = Self::next_item_id(&mut inner);
        let parent_path = parent_id
            .and_then(|p| inner.items.get(p))
            .map(|p| p.path.clone())
            .unwrap_or_default();
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{parent_path}/{name}")
        };
        let item = RemoteItem {
            item_id: item_id.clone(),
            parent_id: parent_id.cloned(),
            path,
            name: name.to_string(),
            item_type: ItemType::Folder,
            size: 0,
            hash: None,
            mtime_ns: 0,
            deleted: false,
        };
        inner.items.insert(item_id, item.clone());
        Ok(item)
    }

    async fn move_item(
        &self,
        item_id: &ItemId,
        new_parent_id: Option<&ItemId>,
        new_name: &str,
    ) -> Result<RemoteItem, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::MoveItem {
            item_id: item_id.clone(),
            new_parent_id: new_parent_id.cloned(),
            new_name: new_name.to_string(),
        });

        let parent_path = new_parent_id
            .and_then(|p| inner.items.get(p))
            .map(|p| p.path.clone())
            .unwrap_or_default();
        let new_path = if parent_path.is_empty() {
            new_name.to_string()
        } else {
            format!("{parent_path}/{new_name}")
        };

        let item = inner
            .items
            .get_mut(item_id)
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))?;
        item.parent_id = new_parent_id.cloned();
        item.name = new_name.to_string();
        item.path = new_path;
        Ok(item.clone())
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::DeleteItem { item_id: item_id.clone() });
        inner.items.remove(item_id);
        inner.content.remove(item_id);
        Ok(())
    }
}

#[async_trait]
impl DownloadApi for FakeRemoteApi {
    async fn download(&self, item_id: &ItemId) -> Result<Vec<u8>, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::Download { item_id: item_id.clone() });
        inner
            .content
            .get(item_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))
    }
}

#[async_trait]
impl UploadApi for FakeRemoteApi {
    async fn upload_simple(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<RemoteItem, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::UploadSimple {
            parent_id: parent_id.cloned(),
            name: name.to_string(),
            len: bytes.len(),
        });

        let item_id = Self::next_item_id(&mut inner);
        let parent_path = parent_id
            .and_then(|p| inner.items.get(p))
            .map(|p| p.path.clone())
            .unwrap_or_default();
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{parent_path}/{name}")
        };
        let item = RemoteItem {
            item_id: item_id.clone(),
            parent_id: parent_id.cloned(),
            path,
            name: name.to_string(),
            item_type: ItemType::File,
            size: bytes.len() as u64,
            hash: Some(sha256_hex(&bytes)),
            mtime_ns: 0,
            deleted: false,
        };
        inner.content.insert(item_id.clone(), bytes);
        inner.items.insert(item_id, item.clone());
        Ok(item)
    }

    async fn create_session(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
        total_size: u64,
    ) -> Result<String, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::CreateSession {
            parent_id: parent_id.cloned(),
            name: name.to_string(),
            total_size,
        });
        inner.next_seq += 1;
        let url = format!("fake-session-{}", inner.next_seq);
        inner.sessions.insert(
            url.clone(),
            UploadSession {
                parent_id: parent_id.cloned(),
                name: name.to_string(),
                buffer: vec![0u8; total_size as usize],
                total_size,
            },
        );
        Ok(url)
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        offset: u64,
        bytes: &[u8],
        total_size: u64,
    ) -> Result<Option<RemoteItem>, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RemoteCall::UploadChunk {
            session_url: session_url.to_string(),
            offset,
            len: bytes.len(),
        });

        let done = {
            let session = inner
                .sessions
                .get_mut(session_url)
                .ok_or_else(|| RemoteError::SessionExpired(session_url.to_string()))?;
            let start = offset as usize;
            session.buffer[start..start + bytes.len()].copy_from_slice(bytes);
            start + bytes.len() == total_size as usize
        };

        if !done {
            return Ok(None);
        }

        let session = inner.sessions.remove(session_url).expect("checked above");
        let item_id = Self::next_item_id(&mut inner);
        let parent_path = session
            .parent_id
            .as_ref()
            .and_then(|p| inner.items.get(p))
            .map(|p| p.path.clone())
            .unwrap_or_default();
        let path = if parent_path.is_empty() {
            session.name.clone()
        } else {
            format!("{parent_path}/{}", session.name)
        };
        let item = RemoteItem {
            item_id: item_id.clone(),
            parent_id: session.parent_id,
            path,
            name: session.name,
            item_type: ItemType::File,
            size: session.buffer.len() as u64,
            hash: Some(sha256_hex(&session.buffer)),
            mtime_ns: 0,
            deleted: false,
        };
        inner.content.insert(item_id.clone(), session.buffer);
        inner.items.insert(item_id, item.clone());
        Ok(Some(item))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
