// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use odsync_core::ItemId;

fn item(id: &str, parent: Option<&str>, name: &str, item_type: ItemType) -> RemoteItem {
    RemoteItem {
        item_id: ItemId::new(id),
        parent_id: parent.map(ItemId::new),
        path: name.to_string(),
        name: name.to_string(),
        item_type,
        size: 0,
        hash: None,
        mtime_ns: 0,
        deleted: false,
    }
}

#[tokio::test]
async fn fetch_delta_with_no_token_returns_all_seeded_items_once() {
    let remote = FakeRemoteApi::new();
    remote.seed_item(item("i1", None, "a.txt", ItemType::File), Some(b"hi".to_vec()));

    let page = remote.fetch_delta(None).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.delta_link.as_deref(), Some("v1"));

    // A second call with the saved token and no queued pages is empty.
    let page2 = remote.fetch_delta(page.delta_link.as_deref()).await.unwrap();
    assert!(page2.items.is_empty());
}

#[tokio::test]
async fn expired_token_fails_once_then_succeeds() {
    let remote = FakeRemoteApi::new();
    remote.expire_token("stale");

    let err = remote.fetch_delta(Some("stale")).await.unwrap_err();
    assert!(matches!(err, RemoteError::DeltaExpired));

    let page = remote.fetch_delta(Some("stale")).await.unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn create_folder_is_idempotent_by_parent_and_name() {
    let remote = FakeRemoteApi::new();
    let first = remote.create_folder(None, "docs").await.unwrap();
    let second = remote.create_folder(None, "docs").await.unwrap();
    assert_eq!(first.item_id, second.item_id);
}

#[tokio::test]
async fn move_item_updates_path_and_parent() {
    let remote = FakeRemoteApi::new();
    let folder = remote.create_folder(None, "docs").await.unwrap();
    let file = remote
        .upload_simple(None, "a.txt", b"hello".to_vec())
        .await
        .unwrap();

    let moved = remote
        .move_item(&file.item_id, Some(&folder.item_id), "b.txt")
        .await
        .unwrap();
    assert_eq!(moved.path, "docs/b.txt");
    assert_eq!(moved.parent_id.as_ref(), Some(&folder.item_id));
}

#[tokio::test]
async fn upload_simple_stores_content_and_hash() {
    let remote = FakeRemoteApi::new();
    let item = remote
        .upload_simple(None, "a.txt", b"hello local".to_vec())
        .await
        .unwrap();
    assert_eq!(item.hash, Some(crate::hash::sha256_hex(b"hello local")));
    assert_eq!(remote.content(&item.item_id), Some(b"hello local".to_vec()));
}

#[tokio::test]
async fn resumable_upload_completes_on_final_chunk() {
    let remote = FakeRemoteApi::new();
    let session = remote.create_session(None, "big.bin", 10).await.unwrap();

    let partial = remote.upload_chunk(&session, 0, &[1u8; 5], 10).await.unwrap();
    assert!(partial.is_none());

    let done = remote.upload_chunk(&session, 5, &[2u8; 5], 10).await.unwrap();
    let item = done.expect("final chunk should complete the upload");
    assert_eq!(item.size, 10);
    assert_eq!(remote.content(&item.item_id).unwrap().len(), 10);
}

#[tokio::test]
async fn upload_chunk_on_unknown_session_is_session_expired() {
    let remote = FakeRemoteApi::new();
    let err = remote
        .upload_chunk("ghost-session", 0, &[0u8; 1], 1)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::SessionExpired(_)));
}

#[tokio::test]
async fn delete_item_removes_item_and_content() {
    let remote = FakeRemoteApi::new();
    let item = remote.upload_simple(None, "a.txt", b"x".to_vec()).await.unwrap();
    remote.delete_item(&item.item_id).await.unwrap();
    assert!(remote.item(&item.item_id).is_none());
    assert!(remote.get_item(&item.item_id).await.is_err());
}

#[tokio::test]
async fn list_children_filters_by_parent() {
    let remote = FakeRemoteApi::new();
    let folder = remote.create_folder(None, "docs").await.unwrap();
    remote
        .upload_simple(Some(&folder.item_id), "a.txt", b"x".to_vec())
        .await
        .unwrap();
    remote.upload_simple(None, "root.txt", b"y".to_vec()).await.unwrap();

    let children = remote.list_children(&folder.item_id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "a.txt");
}
