// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token REST client satisfying [`RemoteApi`](super::RemoteApi).
//!
//! Wire format (delta paging, JSON item shape, resumable-session headers) is
//! this crate's own — §1 treats the transport as an external collaborator and
//! specifies only the abstract operations, so nothing here is pinned to a
//! particular vendor's API.

use std::sync::Arc;

use async_trait::async_trait;
use odsync_core::{ItemId, ItemType};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{DeltaApi, DeltaPage, DownloadApi, ItemApi, RemoteError, RemoteItem, UploadApi};

#[derive(Debug, Serialize, Deserialize)]
struct WireItem {
    item_id: String,
    parent_id: Option<String>,
    path: String,
    name: String,
    item_type: ItemType,
    size: u64,
    hash: Option<String>,
    mtime_ns: i64,
    #[serde(default)]
    deleted: bool,
}

impl From<WireItem> for RemoteItem {
    fn from(w: WireItem) -> Self {
        RemoteItem {
            item_id: ItemId::new(w.item_id),
            parent_id: w.parent_id.map(ItemId::new),
            path: w.path,
            name: w.name,
            item_type: w.item_type,
            size: w.size,
            hash: w.hash,
            mtime_ns: w.mtime_ns,
            deleted: w.deleted,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireDeltaPage {
    items: Vec<WireItem>,
    next_link: Option<String>,
    delta_link: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateFolderBody<'a> {
    parent_id: Option<&'a str>,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct MoveItemBody<'a> {
    new_parent_id: Option<&'a str>,
    new_name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateSessionBody<'a> {
    parent_id: Option<&'a str>,
    name: &'a str,
    total_size: u64,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    session_url: String,
}

/// REST implementation of [`RemoteApi`](super::RemoteApi) over a single
/// `base_url`, authenticated with a bearer token handed to it at
/// construction (the engine does not mint or refresh tokens; see §1).
#[derive(Clone)]
pub struct HttpRemoteApi {
    client: Client,
    base_url: Arc<str>,
    token: Arc<str>,
}

impl HttpRemoteApi {
    pub fn new(base_url: impl Into<Arc<str>>, token: impl Into<Arc<str>>) -> Self {
        Self { client: Client::new(), base_url: base_url.into(), token: token.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn map_status(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RemoteError::Auth(resp.status().to_string()))
            }
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(resp.url().to_string())),
            StatusCode::GONE => Err(RemoteError::DeltaExpired),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(RemoteError::Network(format!("{s}: {body}")))
            }
        }
    }
}

fn network_err(e: reqwest::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

#[async_trait]
impl DeltaApi for HttpRemoteApi {
    async fn fetch_delta(&self, token: Option<&str>) -> Result<DeltaPage, RemoteError> {
        let mut req = self
            .client
            .get(self.url("/delta"))
            .bearer_auth(&*self.token);
        if let Some(t) = token {
            req = req.query(&[("token", t)]);
        }
        let resp = Self::map_status(req.send().await.map_err(network_err)?).await?;
        let page: WireDeltaPage = resp.json().await.map_err(network_err)?;
        Ok(DeltaPage {
            items: page.items.into_iter().map(Into::into).collect(),
            next_link: page.next_link,
            delta_link: page.delta_link,
        })
    }
}

#[async_trait]
impl ItemApi for HttpRemoteApi {
    async fn get_item(&self, item_id: &ItemId) -> Result<RemoteItem, RemoteError> {
        let resp = self
            .client
            .get(self.url(&format!("/items/{}", item_id.as_str())))
            .bearer_auth(&*self.token)
            .send()
            .await
            .map_err(network_err)?;
        let resp = Self::map_status(resp).await?;
        let item: WireItem = resp.json().await.map_err(network_err)?;
        Ok(item.into())
    }

    async fn list_children(&self, item_id: &ItemId) -> Result<Vec<RemoteItem>, RemoteError> {
        let resp = self
            .client
            .get(self.url(&format!("/items/{}/children", item_id.as_str())))
            .bearer_auth(&*self.token)
            .send()
            .await
            .map_err(network_err)?;
        let resp = Self::map_status(resp).await?;
        let items: Vec<WireItem> = resp.json().await.map_err(network_err)?;
        Ok(items.into_iter().map(Into::into).collect())
    }

    async fn create_folder(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
    ) -> Result<RemoteItem, RemoteError> {
        let body = CreateFolderBody { parent_id: parent_id.map(ItemId::as_str), name };
        let resp = self
            .client
            .post(self.url("/items/folders"))
            .bearer_auth(&*self.token)
            .json(&body)
            .send()
            .await
            .map_err(network_err)?;
        let resp = Self::map_status(resp).await?;
        let item: WireItem = resp.json().await.map_err(network_err)?;
        Ok(item.into())
    }

    async fn move_item(
        &self,
        item_id: &ItemId,
        new_parent_id: Option<&ItemId>,
        new_name: &str,
    ) -> Result<RemoteItem, RemoteError> {
        let body = MoveItemBody { new_parent_id: new_parent_id.map(ItemId::as_str), new_name };
        let resp = self
            .client
            .patch(self.url(&format!("/items/{}", item_id.as_str())))
            .bearer_auth(&*self.token)
            .json(&body)
            .send()
            .await
            .map_err(network_err)?;
        let resp = Self::map_status(resp).await?;
        let item: WireItem = resp.json().await.map_err(network_err)?;
        Ok(item.into())
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), RemoteError> {
        let resp = self
            .client
            .delete(self.url(&format!("/items/{}", item_id.as_str())))
            .bearer_auth(&*self.token)
            .send()
            .await
            .map_err(network_err)?;
        Self::map_status(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl DownloadApi for HttpRemoteApi {
    async fn download(&self, item_id: &ItemId) -> Result<Vec<u8>, RemoteError> {
        let resp = self
            .client
            .get(self.url(&format!("/items/{}/content", item_id.as_str())))
            .bearer_auth(&*self.token)
            .send()
            .await
            .map_err(network_err)?;
        let resp = Self::map_status(resp).await?;
        Ok(resp.bytes().await.map_err(network_err)?.to_vec())
    }
}

#[async_trait]
impl UploadApi for HttpRemoteApi {
    async fn upload_simple(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<RemoteItem, RemoteError> {
        let path = match parent_id {
            Some(p) => format!("/items/{}/children/{}/content", p.as_str(), name),
            None => format!("/items/root/children/{name}/content"),
        };
        let resp = self
            .client
            .put(self.url(&path))
            .bearer_auth(&*self.token)
            .body(bytes)
            .send()
            .await
            .map_err(network_err)?;
        let resp = Self::map_status(resp).await?;
        let item: WireItem = resp.json().await.map_err(network_err)?;
        Ok(item.into())
    }

    async fn create_session(
        &self,
        parent_id: Option<&ItemId>,
        name: &str,
        total_size: u64,
    ) -> Result<String, RemoteError> {
        let body = CreateSessionBody { parent_id: parent_id.map(ItemId::as_str), name, total_size };
        let resp = self
            .client
            .post(self.url("/items/createUploadSession"))
            .bearer_auth(&*self.token)
            .json(&body)
            .send()
            .await
            .map_err(network_err)?;
        let resp = Self::map_status(resp).await?;
        let created: SessionCreated = resp.json().await.map_err(network_err)?;
        Ok(created.session_url)
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        offset: u64,
        bytes: &[u8],
        total_size: u64,
    ) -> Result<Option<RemoteItem>, RemoteError> {
        let last_byte = offset + bytes.len() as u64 - 1;
        let resp = self
            .client
            .put(session_url)
            .header(
                "Content-Range",
                format!("bytes {offset}-{last_byte}/{total_size}"),
            )
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(network_err)?;

        match resp.status() {
            StatusCode::ACCEPTED => Ok(None),
            s if s.is_success() => {
                let item: WireItem = resp.json().await.map_err(network_err)?;
                Ok(Some(item.into()))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(RemoteError::SessionExpired(session_url.to_string()))
            }
            s => Err(RemoteError::Network(s.to_string())),
        }
    }
}
