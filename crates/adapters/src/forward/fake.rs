// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use async_trait::async_trait;
use gr_core::PortForwardSpec;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{resolve_pod, ForwardError, ForwardHandle, PortForwarder};
use crate::cluster::FakeCluster;

struct Opened {
    spec: PortForwardSpec,
    stop: CancellationToken,
}

#[derive(Default)]
struct FakeForwarderState {
    opened: Vec<Opened>,
    failures: Vec<ForwardError>,
}

/// Fake forwarder for testing.
///
/// With a cluster attached, targets are resolved through [`resolve_pod`]
/// exactly like the real forwarder; no sockets are opened.
#[derive(Clone, Default)]
pub struct FakeForwarder {
    cluster: Option<FakeCluster>,
    inner: Arc<Mutex<FakeForwarderState>>,
}

impl FakeForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(cluster: FakeCluster) -> Self {
        Self { cluster: Some(cluster), inner: Arc::default() }
    }

    /// Fail the next forward with `err`.
    pub fn fail_next(&self, err: ForwardError) -> &Self {
        self.inner.lock().failures.push(err);
        self
    }

    /// Every spec forwarded so far, in order.
    pub fn opened(&self) -> Vec<PortForwardSpec> {
        self.inner.lock().opened.iter().map(|o| o.spec.clone()).collect()
    }

    /// Forwards whose handle has not been stopped or dropped.
    pub fn active(&self) -> Vec<PortForwardSpec> {
        self.inner
            .lock()
            .opened
            .iter()
            .filter(|o| !o.stop.is_cancelled())
            .map(|o| o.spec.clone())
            .collect()
    }
}

#[async_trait]
impl PortForwarder for FakeForwarder {
    async fn forward(&self, spec: &PortForwardSpec) -> Result<ForwardHandle, ForwardError> {
        if let Some(err) = {
            let mut state = self.inner.lock();
            (!state.failures.is_empty()).then(|| state.failures.remove(0))
        } {
            return Err(err);
        }
        if let Some(cluster) = &self.cluster {
            resolve_pod(cluster, &spec.namespace, spec.kind, &spec.name).await?;
        }
        let stop = CancellationToken::new();
        self.inner.lock().opened.push(Opened { spec: spec.clone(), stop: stop.clone() });
        Ok(ForwardHandle::new(spec.host_port, stop))
    }
}
