// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local port forwarding to pods (C10).
//!
//! A forward is addressed by a [`PortForwardSpec`]; services and deployments
//! resolve to their first running pod through [`resolve_pod`]. The returned
//! [`ForwardHandle`] exists only once the local listener is bound, so holding
//! one means the tunnel is ready. Dropping or stopping the handle closes it.

mod k8s;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use k8s::KubeForwarder;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeForwarder;

use async_trait::async_trait;
use gr_core::{PortForwardSpec, ResourceKind};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::{Cluster, ClusterError, ClusterExt};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForwardError {
    #[error("no pods found for service {0}")]
    NoPodsForService(String),

    #[error("no running pods found for service {0}")]
    NoRunningPodsForService(String),

    #[error("no pods found for deployment {0}")]
    NoPodsForDeployment(String),

    #[error("no running pods found for deployment {0}")]
    NoRunningPodsForDeployment(String),

    #[error("unsupported spec kind {0}")]
    UnsupportedKind(String),

    #[error("local port {0} is already in use")]
    PortInUse(u16),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("port forward stream failed: {0}")]
    Stream(String),
}

/// Open tunnel from `localhost:<local_port>` into a pod.
#[derive(Debug)]
pub struct ForwardHandle {
    local_port: u16,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ForwardHandle {
    pub fn new(local_port: u16, stop: CancellationToken) -> Self {
        Self { local_port, stop, task: None }
    }

    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Token cancelled when the forward is stopped.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Stop and wait for the accept loop to exit.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ForwardHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[async_trait]
pub trait PortForwarder: Clone + Send + Sync + 'static {
    /// Resolve the target pod and start listening on the host port.
    async fn forward(&self, spec: &PortForwardSpec) -> Result<ForwardHandle, ForwardError>;
}

fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
}

fn selector_string(labels: &std::collections::BTreeMap<String, String>) -> String {
    labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

/// Number of pods matching `selector` and the first running one.
async fn first_running<C: Cluster>(
    cluster: &C,
    namespace: &str,
    selector: &str,
) -> Result<(usize, Option<Pod>), ForwardError> {
    let pods: Vec<Pod> = cluster.list_typed(Some(namespace), Some(selector)).await?;
    let total = pods.len();
    Ok((total, pods.into_iter().find(is_running)))
}

/// Resolve a forward target to a single running pod.
pub async fn resolve_pod<C: Cluster>(
    cluster: &C,
    namespace: &str,
    kind: ResourceKind,
    name: &str,
) -> Result<Pod, ForwardError> {
    match kind {
        ResourceKind::Pod => Ok(cluster.get_typed::<Pod>(Some(namespace), name).await?),
        ResourceKind::Service => {
            let svc: Service = cluster.get_typed(Some(namespace), name).await?;
            let selector = svc
                .spec
                .and_then(|s| s.selector)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ForwardError::NoPodsForService(name.to_string()))?;
            match first_running(cluster, namespace, &selector_string(&selector)).await? {
                (0, _) => Err(ForwardError::NoPodsForService(name.to_string())),
                (_, None) => Err(ForwardError::NoRunningPodsForService(name.to_string())),
                (_, Some(pod)) => Ok(pod),
            }
        }
        ResourceKind::Deployment => {
            let deploy: Deployment = cluster.get_typed(Some(namespace), name).await?;
            let selector = deploy
                .spec
                .and_then(|s| s.selector.match_labels)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ForwardError::NoPodsForDeployment(name.to_string()))?;
            match first_running(cluster, namespace, &selector_string(&selector)).await? {
                (0, _) => Err(ForwardError::NoPodsForDeployment(name.to_string())),
                (_, None) => Err(ForwardError::NoRunningPodsForDeployment(name.to_string())),
                (_, Some(pod)) => Ok(pod),
            }
        }
    }
}

/// First running pod carrying all of `selector`'s labels.
pub async fn running_pod_by_labels<C: Cluster>(
    cluster: &C,
    namespace: &str,
    selector: &str,
) -> Result<Option<Pod>, ForwardError> {
    Ok(first_running(cluster, namespace, selector).await?.1)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
