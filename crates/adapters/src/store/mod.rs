// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S3-compatible object store seam used by directory sync.

mod s3;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use self::s3::S3Store;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeStore, StoreCall};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from object store operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("bucket {0} does not exist (NoSuchBucket)")]
    NoSuchBucket(String),

    /// Raised by some servers for zero-length uploads.
    #[error("missing content length for {0}")]
    MissingContentLength(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

/// Minimal bucket API for the dev bucket.
#[async_trait]
pub trait ObjectStore: Clone + Send + Sync + 'static {
    /// Remove a bucket. With `force`, objects are deleted first.
    async fn remove_bucket(&self, bucket: &str, force: bool) -> Result<(), StoreError>;

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Keys in the bucket, sorted.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
