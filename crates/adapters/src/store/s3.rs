// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use gr_core::BucketCredentials;
use ::s3::bucket::Bucket;
use ::s3::creds::Credentials;
use ::s3::error::S3Error;
use ::s3::{BucketConfiguration, Region};

use super::{ObjectStore, StoreError};

/// Region name the dev bucket server accepts.
const REGION: &str = "us-east-1";

/// [`ObjectStore`] talking to an S3-compatible endpoint with path-style
/// addressing.
#[derive(Clone)]
pub struct S3Store {
    endpoint: String,
    region: Region,
    credentials: Credentials,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store").field("endpoint", &self.endpoint).finish()
    }
}

impl S3Store {
    /// `endpoint` is a URL such as `http://localhost:9000`.
    pub fn new(endpoint: &str, credentials: &BucketCredentials) -> Result<Self, StoreError> {
        let credentials = Credentials::new(
            Some(&credentials.access_key),
            Some(&credentials.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StoreError::Config(e.to_string()))?;
        let region = Region::Custom { region: REGION.to_string(), endpoint: endpoint.to_string() };
        Ok(Self { endpoint: endpoint.to_string(), region, credentials })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StoreError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StoreError::Config(e.to_string()))?;
        Ok(bucket.with_path_style())
    }
}

/// Classify an S3 failure for `bucket`/`key`.
fn classify(e: S3Error, bucket: &str, key: &str) -> StoreError {
    match e {
        S3Error::HttpFailWithBody(404, body) if body.contains("NoSuchBucket") => {
            StoreError::NoSuchBucket(bucket.to_string())
        }
        S3Error::HttpFailWithBody(411, _) => StoreError::MissingContentLength(key.to_string()),
        S3Error::HttpFailWithBody(_, body) if body.contains("MissingContentLength") => {
            StoreError::MissingContentLength(key.to_string())
        }
        other => StoreError::Request(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn remove_bucket(&self, bucket: &str, force: bool) -> Result<(), StoreError> {
        let handle = self.bucket(bucket)?;
        if force {
            for key in self.list_objects(bucket).await? {
                handle.delete_object(&key).await.map_err(|e| classify(e, bucket, &key))?;
            }
        }
        handle.delete().await.map_err(|e| classify(e, bucket, ""))?;
        tracing::debug!(bucket, "removed bucket");
        Ok(())
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        Bucket::create_with_path_style(
            bucket,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        .map_err(|e| classify(e, bucket, ""))?;
        tracing::debug!(bucket, "created bucket");
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.bucket(bucket)?.put_object(key, &body).await.map_err(|e| classify(e, bucket, key))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let pages = self
            .bucket(bucket)?
            .list(String::new(), None)
            .await
            .map_err(|e| classify(e, bucket, ""))?;
        let mut keys: Vec<String> =
            pages.into_iter().flat_map(|page| page.contents.into_iter().map(|o| o.key)).collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "s3_tests.rs"]
mod tests;
