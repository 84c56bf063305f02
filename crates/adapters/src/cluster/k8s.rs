// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
    PatchParams, PostParams,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::Scope;
use kube::Client;
use parking_lot::Mutex;

use super::{display_ref, Cluster, ClusterError};

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) => match resp.code {
                404 => Self::NotFound(resp.message),
                409 if resp.reason == "AlreadyExists" => Self::AlreadyExists(resp.message),
                409 => Self::Conflict(resp.message),
                403 => Self::Forbidden(resp.message),
                408 | 504 => Self::Timeout(resp.message),
                _ => Self::Api(format!("{} ({})", resp.message, resp.code)),
            },
            kube::Error::SerdeError(e) => Self::Serde(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// [`Cluster`] backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    context: String,
    discovered: Arc<Mutex<HashMap<GroupVersionKind, (ApiResource, bool)>>>,
}

impl KubeCluster {
    /// Connect using the default kubeconfig, optionally switching context.
    pub async fn connect(context: Option<&str>) -> Result<Self, ClusterError> {
        let options = KubeConfigOptions { context: context.map(str::to_string), ..Default::default() };
        let config = kube::Config::from_kubeconfig(&options)
            .await
            .map_err(|e| ClusterError::Transport(format!("failed to load kubeconfig: {e}")))?;
        let client = Client::try_from(config)?;
        let context = match context {
            Some(c) => c.to_string(),
            None => current_context().unwrap_or_default(),
        };
        tracing::debug!(%context, "connected to cluster");
        Ok(Self::from_client(client, context))
    }

    /// Connect through an in-memory kubeconfig document, such as the one a
    /// virtual cluster publishes.
    pub async fn from_kubeconfig_yaml(yaml: &str, context: &str) -> Result<Self, ClusterError> {
        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .map_err(|e| ClusterError::Transport(format!("invalid kubeconfig: {e}")))?;
        let options = KubeConfigOptions { context: Some(context.to_string()), ..Default::default() };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| ClusterError::Transport(format!("failed to load kubeconfig: {e}")))?;
        let client = Client::try_from(config)?;
        Ok(Self::from_client(client, context))
    }

    pub fn from_client(client: Client, context: impl Into<String>) -> Self {
        Self { client, context: context.into(), discovered: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Kube context this cluster was connected through.
    pub fn context(&self) -> &str {
        &self.context
    }

    fn api(&self, api: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, api),
            None => Api::all_with(self.client.clone(), api),
        }
    }
}

/// `current-context` of the default kubeconfig.
pub fn current_context() -> Option<String> {
    Kubeconfig::read().ok().and_then(|k| k.current_context)
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        self.api(api, namespace).get(name).await.map_err(|e| match ClusterError::from(e) {
            ClusterError::NotFound(_) => {
                ClusterError::NotFound(format!("{} {}", api.kind, display_ref(namespace, name)))
            }
            other => other,
        })
    }

    async fn list(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            params = params.labels(selector);
        }
        Ok(self.api(api, namespace).list(&params).await?.items)
    }

    async fn create(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        Ok(self.api(api, namespace).create(&PostParams::default(), obj).await?)
    }

    async fn replace(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        Ok(self.api(api, namespace).replace(&name, &PostParams::default(), obj).await?)
    }

    async fn merge_patch(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, ClusterError> {
        Ok(self
            .api(api, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn apply(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
        field_manager: &str,
    ) -> Result<DynamicObject, ClusterError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let params = PatchParams::apply(field_manager).force();
        Ok(self.api(api, namespace).patch(&name, &params, &Patch::Apply(obj)).await?)
    }

    async fn delete(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.api(api, namespace).delete(name, &DeleteParams::background()).await?;
        Ok(())
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, bool), ClusterError> {
        if let Some(hit) = self.discovered.lock().get(gvk).cloned() {
            return Ok(hit);
        }
        let (resource, caps) =
            kube::discovery::pinned_kind(&self.client, gvk).await.map_err(|e| {
                match ClusterError::from(e) {
                    ClusterError::NotFound(_) => ClusterError::NotFound(format!(
                        "no resource registered for {}/{} {}",
                        gvk.group, gvk.version, gvk.kind
                    )),
                    other => other,
                }
            })?;
        let resolved = (resource, caps.scope == Scope::Namespaced);
        self.discovered.lock().insert(gvk.clone(), resolved.clone());
        Ok(resolved)
    }
}
