// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ObjectStore, StoreError};

/// Recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    RemoveBucket { bucket: String, force: bool },
    MakeBucket { bucket: String },
    PutObject { bucket: String, key: String },
    ListObjects { bucket: String },
}

#[derive(Default)]
struct FakeStoreState {
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    calls: Vec<StoreCall>,
    put_failures: HashMap<String, StoreError>,
    reject_empty: bool,
}

/// In-memory S3 for testing
#[derive(Clone, Default)]
pub struct FakeStore {
    inner: Arc<Mutex<FakeStoreState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    /// Contents of `bucket`, empty when it does not exist.
    pub fn objects(&self, bucket: &str) -> BTreeMap<String, Vec<u8>> {
        self.inner.lock().buckets.get(bucket).cloned().unwrap_or_default()
    }

    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.inner.lock().buckets.contains_key(bucket)
    }

    /// Every upload of `key` fails with `err`.
    pub fn fail_put(&self, key: &str, err: StoreError) -> &Self {
        self.inner.lock().put_failures.insert(key.to_string(), err);
        self
    }

    /// Zero-length uploads fail with [`StoreError::MissingContentLength`],
    /// like some S3 servers do.
    pub fn reject_empty_objects(&self) -> &Self {
        self.inner.lock().reject_empty = true;
        self
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn remove_bucket(&self, bucket: &str, force: bool) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::RemoveBucket { bucket: bucket.to_string(), force });
        match state.buckets.get(bucket) {
            None => Err(StoreError::NoSuchBucket(bucket.to_string())),
            Some(objects) if !force && !objects.is_empty() => {
                Err(StoreError::Request(format!("bucket {bucket} is not empty")))
            }
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::MakeBucket { bucket: bucket.to_string() });
        if state.buckets.contains_key(bucket) {
            return Err(StoreError::Request(format!("bucket {bucket} already owned by you")));
        }
        state.buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::PutObject { bucket: bucket.to_string(), key: key.to_string() });
        if let Some(err) = state.put_failures.get(key) {
            return Err(err.clone());
        }
        if state.reject_empty && body.is_empty() {
            return Err(StoreError::MissingContentLength(key.to_string()));
        }
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::ListObjects { bucket: bucket.to_string() });
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))
    }
}
