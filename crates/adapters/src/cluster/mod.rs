// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes API seam.
//!
//! # Module layout
//!
//! - [`k8s`]: [`KubeCluster`], the `kube::Client` backed implementation
//! - `fake`: in-memory [`FakeCluster`] with reactors and a call log
//!   (`test-support` feature)
//!
//! Everything goes through [`DynamicObject`] so the apply engine and the
//! inventory walker can handle kinds unknown at compile time. [`ClusterExt`]
//! layers typed access on top for the kinds the engine builds itself.

mod k8s;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use k8s::{current_context, KubeCluster};
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ClusterCall, FakeCluster, Reactor, Verb};

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Resource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to convert object: {0}")]
    Serde(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

/// Minimal Kubernetes API surface used by the engine.
///
/// `namespace` is `None` for cluster-scoped kinds and for listing across
/// all namespaces.
#[async_trait]
pub trait Cluster: Clone + Send + Sync + 'static {
    async fn get(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError>;

    /// List objects, optionally filtered by an equality label selector
    /// (`a=b,c=d`).
    async fn list(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError>;

    async fn create(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Replace an object. Fails with [`ClusterError::Conflict`] when
    /// `metadata.resourceVersion` is stale.
    async fn replace(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    async fn merge_patch(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, ClusterError>;

    /// Server-side apply owned by `field_manager`.
    async fn apply(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
        field_manager: &str,
    ) -> Result<DynamicObject, ClusterError>;

    async fn delete(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError>;

    /// Discover the resource for a kind and whether it is namespaced.
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, bool), ClusterError>;
}

/// Typed convenience over [`Cluster`] for kinds with a static type.
#[async_trait]
pub trait ClusterExt: Cluster {
    async fn get_typed<K>(&self, namespace: Option<&str>, name: &str) -> Result<K, ClusterError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static,
    {
        let obj = self.get(&api_resource::<K>(), namespace, name).await?;
        from_dynamic(obj)
    }

    /// `Ok(None)` on NotFound.
    async fn get_opt<K>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, ClusterError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static,
    {
        match self.get_typed::<K>(namespace, name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(ClusterError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_typed<K>(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<K>, ClusterError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static,
    {
        let objs = self.list(&api_resource::<K>(), namespace, selector).await?;
        objs.into_iter().map(from_dynamic).collect()
    }

    async fn create_typed<K>(&self, namespace: Option<&str>, obj: &K) -> Result<K, ClusterError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let created = self.create(&api_resource::<K>(), namespace, &to_dynamic(obj)?).await?;
        from_dynamic(created)
    }

    /// Create unless an object with the same name already exists.
    /// Returns `true` when the object was created.
    async fn create_if_absent<K>(&self, namespace: Option<&str>, obj: &K) -> Result<bool, ClusterError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        match self.create_typed(namespace, obj).await {
            Ok(_) => Ok(true),
            Err(ClusterError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_typed<K>(&self, namespace: Option<&str>, name: &str) -> Result<(), ClusterError>
    where
        K: Resource<DynamicType = ()> + Send + 'static,
    {
        self.delete(&api_resource::<K>(), namespace, name).await
    }

    /// Delete, treating NotFound as success. Returns `true` if something was deleted.
    async fn delete_if_present<K>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError>
    where
        K: Resource<DynamicType = ()> + Send + 'static,
    {
        match self.delete_typed::<K>(namespace, name).await {
            Ok(()) => Ok(true),
            Err(ClusterError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<C: Cluster> ClusterExt for C {}

/// [`ApiResource`] for a statically typed kind.
pub fn api_resource<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, ClusterError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K, ClusterError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Parse an equality selector `a=b,c=d` into pairs.
pub fn parse_selector(selector: &str) -> Vec<(String, String)> {
    selector
        .split(',')
        .filter_map(|term| {
            let term = term.trim();
            let (k, v) = term.split_once("==").or_else(|| term.split_once('='))?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

/// `namespace/name` or just `name` for log lines and error messages.
pub fn display_ref(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
