// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fake_store_round_trip() {
    let store = FakeStore::new();
    store.make_bucket("b").await.unwrap();
    store.put_object("b", "dir/a.yaml", b"a: 1".to_vec()).await.unwrap();
    store.put_object("b", "b.yaml", b"b: 1".to_vec()).await.unwrap();

    assert_eq!(store.list_objects("b").await.unwrap(), vec!["b.yaml", "dir/a.yaml"]);
    assert_eq!(store.objects("b")["dir/a.yaml"], b"a: 1");
}

#[tokio::test]
async fn removing_missing_bucket_reports_no_such_bucket() {
    let store = FakeStore::new();
    let err = store.remove_bucket("b", true).await.unwrap_err();
    assert_eq!(err, StoreError::NoSuchBucket("b".into()));
    assert!(err.to_string().contains("NoSuchBucket"));
}

#[tokio::test]
async fn non_forced_removal_requires_empty_bucket() {
    let store = FakeStore::new();
    store.make_bucket("b").await.unwrap();
    store.put_object("b", "k", b"v".to_vec()).await.unwrap();

    assert!(matches!(store.remove_bucket("b", false).await, Err(StoreError::Request(_))));
    store.remove_bucket("b", true).await.unwrap();
    assert!(!store.bucket_exists("b"));
}

#[tokio::test]
async fn empty_objects_can_be_rejected() {
    let store = FakeStore::new();
    store.reject_empty_objects();
    store.make_bucket("b").await.unwrap();

    let err = store.put_object("b", "empty", Vec::new()).await.unwrap_err();
    assert_eq!(err, StoreError::MissingContentLength("empty".into()));
}

#[tokio::test]
async fn put_into_missing_bucket_fails() {
    let store = FakeStore::new();
    let err = store.put_object("b", "k", b"v".to_vec()).await.unwrap_err();
    assert_eq!(err, StoreError::NoSuchBucket("b".into()));
}
