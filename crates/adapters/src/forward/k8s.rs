// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use gr_core::PortForwardSpec;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::{resolve_pod, ForwardError, ForwardHandle, PortForwarder};
use crate::cluster::KubeCluster;

/// Port forwarder over the API server's websocket port-forward
/// subresource. Each accepted local connection gets its own stream, so a
/// dropped stream only affects one connection and the next one re-resolves
/// the pod.
#[derive(Clone)]
pub struct KubeForwarder {
    cluster: KubeCluster,
}

impl KubeForwarder {
    pub fn new(cluster: KubeCluster) -> Self {
        Self { cluster }
    }
}

async fn bind(port: u16) -> Result<TcpListener, ForwardError> {
    TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::AddrInUse => ForwardError::PortInUse(port),
        _ => ForwardError::Stream(format!("failed to listen on port {port}: {e}")),
    })
}

/// Pump one local connection through a fresh port-forward stream.
async fn pump(pods: Api<Pod>, pod: String, port: u16, mut conn: TcpStream) -> Result<(), ForwardError> {
    let mut forwarder =
        pods.portforward(&pod, &[port]).await.map_err(|e| ForwardError::Stream(e.to_string()))?;
    let mut upstream = forwarder
        .take_stream(port)
        .ok_or_else(|| ForwardError::Stream(format!("no stream for port {port}")))?;
    tokio::io::copy_bidirectional(&mut conn, &mut upstream)
        .await
        .map_err(|e| ForwardError::Stream(e.to_string()))?;
    drop(upstream);
    forwarder.join().await.map_err(|e| ForwardError::Stream(e.to_string()))
}

#[async_trait]
impl PortForwarder for KubeForwarder {
    async fn forward(&self, spec: &PortForwardSpec) -> Result<ForwardHandle, ForwardError> {
        let pod = resolve_pod(&self.cluster, &spec.namespace, spec.kind, &spec.name).await?;
        let pod_name = pod.metadata.name.unwrap_or_default();
        let listener = bind(spec.host_port).await?;
        let local_port = listener.local_addr().map(|a| a.port()).unwrap_or(spec.host_port);

        let stop = CancellationToken::new();
        let token = stop.clone();
        let pods: Api<Pod> = Api::namespaced(self.cluster.client(), &spec.namespace);
        let spec = spec.clone();
        let cluster = self.cluster.clone();
        tracing::info!(
            namespace = %spec.namespace,
            pod = %pod_name,
            local_port,
            container_port = spec.container_port,
            "port forward ready"
        );

        let task = tokio::spawn(async move {
            let mut pod_name = pod_name;
            loop {
                let conn = tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                let (conn, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "port forward accept failed");
                        continue;
                    }
                };
                // The pod may have been replaced since the last connection.
                match resolve_pod(&cluster, &spec.namespace, spec.kind, &spec.name).await {
                    Ok(pod) => {
                        if let Some(name) = pod.metadata.name {
                            pod_name = name;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "keeping previous pod for port forward"),
                }
                tracing::debug!(%peer, pod = %pod_name, "forwarding connection");
                let pods = pods.clone();
                let target = pod_name.clone();
                let port = spec.container_port;
                let conn_token = token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = conn_token.cancelled() => {}
                        result = pump(pods, target, port, conn) => {
                            if let Err(e) = result {
                                tracing::warn!(error = %e, "port forward connection failed");
                            }
                        }
                    }
                });
            }
            tracing::debug!(local_port, "port forward stopped");
        });

        Ok(ForwardHandle::new(local_port, stop).with_task(task))
    }
}
