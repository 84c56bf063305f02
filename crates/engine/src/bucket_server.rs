// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dev bucket server lifecycle (C2).
//!
//! A single-replica S3-compatible server in the `gitops-run` namespace,
//! reachable from the workstation through a port forward on the Service.

use std::collections::BTreeMap;

use gr_adapters::{Cluster, ClusterError, ClusterExt, ForwardHandle, PortForwarder};
use gr_core::names::{self, labels};
use gr_core::{env, BucketCredentials, PortForwardSpec, ResourceKind};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, Namespace, PodSpec, PodTemplateSpec,
    SecretKeySelector, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use tokio_util::sync::CancellationToken;

use crate::binding::credentials_secret;
use crate::poll::{poll_backoff, Backoff, Poll};
use crate::EngineError;

fn app_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(labels::APP.to_string(), names::DEV_BUCKET.to_string())])
}

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: namespace.map(|_| app_labels()),
        ..Default::default()
    }
}

pub fn run_namespace() -> Namespace {
    Namespace { metadata: meta(names::RUN_NAMESPACE, None), ..Default::default() }
}

pub fn service(http_port: u16, https_port: u16) -> Service {
    let port = |suffix: &str, port: u16| ServicePort {
        name: Some(format!("{}-{suffix}", names::DEV_BUCKET)),
        port: i32::from(port),
        ..Default::default()
    };
    Service {
        metadata: meta(names::DEV_BUCKET, Some(names::RUN_NAMESPACE)),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![port("http", http_port), port("https", https_port)]),
            selector: Some(app_labels()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn secret_env(name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: names::DEV_BUCKET_CREDENTIALS.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn deployment(image: &str, http_port: u16, https_port: u16) -> Deployment {
    let container_port = |port: u16| ContainerPort {
        container_port: i32::from(port),
        host_port: Some(i32::from(port)),
        ..Default::default()
    };
    Deployment {
        metadata: meta(names::DEV_BUCKET, Some(names::RUN_NAMESPACE)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector { match_labels: Some(app_labels()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(app_labels()), ..Default::default() }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: names::DEV_BUCKET.to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        env: Some(vec![
                            secret_env("MINIO_ROOT_USER", names::ACCESS_KEY),
                            secret_env("MINIO_ROOT_PASSWORD", names::SECRET_KEY),
                        ]),
                        ports: Some(vec![container_port(http_port), container_port(https_port)]),
                        args: Some(vec![
                            format!("--http-port={http_port}"),
                            format!("--https-port={https_port}"),
                        ]),
                        ..Default::default()
                    }],
                    restart_policy: Some("Always".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// `Ready` once the observed generation is current and the replica is ready.
fn rollout_state(d: &Deployment) -> Poll<()> {
    let generation = d.metadata.generation.unwrap_or_default();
    let Some(status) = &d.status else {
        return Poll::pending_with("no status reported yet");
    };
    if status.observed_generation.unwrap_or_default() != generation {
        return Poll::pending_with("rollout of the current generation has not been observed");
    }
    match status.ready_replicas.unwrap_or_default() {
        1 => Poll::Ready(()),
        n => Poll::pending_with(format!("{n}/1 replicas ready")),
    }
}

/// Installs, exposes and removes the dev bucket server.
#[derive(Clone)]
pub struct BucketServer<C, F> {
    cluster: C,
    forwarder: F,
    image: String,
    http_port: u16,
    https_port: u16,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl<C: Cluster, F: PortForwarder> BucketServer<C, F> {
    pub fn new(cluster: C, forwarder: F) -> Self {
        Self {
            cluster,
            forwarder,
            image: env::bucket_server_image(),
            http_port: names::DEV_BUCKET_PORT,
            https_port: names::DEV_BUCKET_HTTPS_PORT,
            backoff: Backoff::READINESS,
            cancel: CancellationToken::new(),
        }
    }

    gr_core::setters! {
        into { image: String }
        set { http_port: u16, https_port: u16, backoff: Backoff, cancel: CancellationToken }
    }

    /// Ensure namespace, Service, credentials Secret and Deployment, wait
    /// for the rollout, then forward `localhost:<http_port>` to the Service.
    ///
    /// Dropping the returned handle closes the forward.
    pub async fn install(&self, credentials: &BucketCredentials) -> Result<ForwardHandle, EngineError> {
        let ns = Some(names::RUN_NAMESPACE);
        self.ensure("namespace", names::RUN_NAMESPACE, self.cluster.create_if_absent(None, &run_namespace()))
            .await?;
        self.ensure(
            "service",
            names::DEV_BUCKET,
            self.cluster.create_if_absent(ns, &service(self.http_port, self.https_port)),
        )
        .await?;
        self.ensure(
            "secret",
            names::DEV_BUCKET_CREDENTIALS,
            self.cluster.create_if_absent(ns, &credentials_secret(names::RUN_NAMESPACE, credentials)),
        )
        .await?;
        self.ensure(
            "deployment",
            names::DEV_BUCKET,
            self.cluster.create_if_absent(ns, &deployment(&self.image, self.http_port, self.https_port)),
        )
        .await?;

        tracing::info!("Waiting for deployment {} to be ready ...", names::DEV_BUCKET);
        let cluster = &self.cluster;
        poll_backoff(&self.cancel, &format!("deployment {}/{}", names::RUN_NAMESPACE, names::DEV_BUCKET), self.backoff, move || async move {
            let d: Deployment = cluster.get_typed(ns, names::DEV_BUCKET).await?;
            Ok(rollout_state(&d))
        })
        .await?;

        let spec = PortForwardSpec {
            namespace: names::RUN_NAMESPACE.to_string(),
            name: names::DEV_BUCKET.to_string(),
            kind: ResourceKind::Service,
            host_port: self.http_port,
            container_port: self.http_port,
        };
        let handle = self.forwarder.forward(&spec).await?;
        tracing::info!(local_port = handle.local_port(), "Port forwarding for {} is ready.", names::DEV_BUCKET);
        Ok(handle)
    }

    async fn ensure(
        &self,
        what: &str,
        name: &str,
        create: impl std::future::Future<Output = Result<bool, ClusterError>>,
    ) -> Result<(), EngineError> {
        match create.await {
            Ok(true) => tracing::info!("Created {what} {name}"),
            Ok(false) => tracing::info!("{what} {name} already existed"),
            Err(e) => {
                tracing::error!(error = %e, "Error creating {what} {name}");
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Delete the `gitops-run` namespace and wait until it is gone.
    pub async fn uninstall(&self) -> Result<(), EngineError> {
        tracing::info!("Removing namespace {} ...", names::RUN_NAMESPACE);
        if !self.cluster.delete_if_present::<Namespace>(None, names::RUN_NAMESPACE).await? {
            tracing::debug!("namespace {} already gone", names::RUN_NAMESPACE);
        }

        let cluster = &self.cluster;
        poll_backoff(&self.cancel, &format!("namespace {} to terminate", names::RUN_NAMESPACE), self.backoff, move || async move {
            match cluster.get_typed::<Namespace>(None, names::RUN_NAMESPACE).await {
                Err(ClusterError::NotFound(_)) => Ok(Poll::Ready(())),
                Ok(ns) => Ok(Poll::pending_with(format!(
                    "namespace is {}",
                    ns.status.and_then(|s| s.phase).unwrap_or_else(|| "still present".to_string())
                ))),
                Err(e) => Err(e.into()),
            }
        })
        .await?;
        tracing::info!("Namespace {} terminated", names::RUN_NAMESPACE);
        Ok(())
    }
}

#[cfg(test)]
#[path = "bucket_server_tests.rs"]
mod tests;
