// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Annotation-driven reconcile requests (C1).
//!
//! A request stamps `reconcile.fluxcd.io/requestedAt` with a fresh
//! [`ReconcileStamper`] value. The controller acknowledges it by copying the
//! stamp into `status.lastHandledReconcileRequest`; only then are the
//! readiness conditions meaningful.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gr_adapters::cluster::{api_resource, display_ref};
use gr_adapters::flux::{
    Bucket, HelmChart, HelmRelease, Kustomization, KustomizationStatus, ObjMetadata,
    ReconcileStatus, HEALTHY, READY,
};
use gr_adapters::{Cluster, ClusterError};
use gr_core::names::{self, annotations, labels};
use gr_core::{env, ReconcileStamper};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use tokio_util::sync::CancellationToken;

use crate::poll::{poll_until, retry, Backoff, Poll};
use crate::EngineError;

/// How an acknowledged object is judged ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// `Ready=True`; anything else keeps waiting.
    Ready,
    /// `Ready=True` and `Healthy=True`.
    ReadyAndHealthy,
    /// `Ready=True`; `Ready=False` fails immediately.
    ReadyOrFail,
}

/// Issues reconcile requests and waits for their outcome.
///
/// Every wait stops with [`EngineError::Cancelled`] once the token fires.
#[derive(Clone)]
pub struct Reconciler<C> {
    cluster: C,
    stamper: Arc<ReconcileStamper>,
    interval: Duration,
    cancel: CancellationToken,
}

impl<C: Cluster> Reconciler<C> {
    pub fn new(cluster: C) -> Self {
        Self {
            cluster,
            stamper: Arc::new(ReconcileStamper::new()),
            interval: env::poll_interval(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Waits stop once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stamp a fresh reconcile request on the object and return the stamp.
    ///
    /// Stale writes are retried with [`Backoff::CONFLICT`]; `NotFound` and
    /// `Forbidden` are returned as is.
    pub async fn request(
        &self,
        api: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<String, EngineError> {
        let stamp = self.stamper.next();
        let cluster = &self.cluster;
        let value = stamp.as_str();
        retry(&self.cancel, Backoff::CONFLICT, is_conflict, move || async move {
            let mut obj = cluster.get(api, Some(namespace), name).await?;
            obj.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(annotations::RECONCILE_REQUESTED_AT.to_string(), value.to_string());
            Ok(cluster.replace(api, Some(namespace), &obj).await?)
        })
        .await?;
        tracing::debug!(kind = %api.kind, object = %display_ref(Some(namespace), name), %stamp, "requested reconciliation");
        Ok(stamp)
    }

    /// Wait until the controller has handled `stamp`.
    pub async fn wait_handled(
        &self,
        api: &ApiResource,
        namespace: &str,
        name: &str,
        stamp: &str,
        timeout: Duration,
    ) -> Result<DynamicObject, EngineError> {
        let cluster = &self.cluster;
        let what = format!("{} {} to handle the reconcile request", api.kind, display_ref(Some(namespace), name));
        poll_until(&self.cancel, &what, self.interval, timeout, move || async move {
            let obj = cluster.get(api, Some(namespace), name).await?;
            let status = ReconcileStatus::of(&obj);
            Ok(match status.last_handled_reconcile_request.as_deref() {
                Some(handled) if handled == stamp => Poll::Ready(obj),
                _ => Poll::pending(),
            })
        })
        .await
    }

    /// Wait until the object satisfies `readiness`.
    pub async fn wait_ready(
        &self,
        api: &ApiResource,
        namespace: &str,
        name: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<DynamicObject, EngineError> {
        let cluster = &self.cluster;
        let what = format!("{} {} to be ready", api.kind, display_ref(Some(namespace), name));
        poll_until(&self.cancel, &what, self.interval, timeout, move || async move {
            let obj = cluster.get(api, Some(namespace), name).await?;
            judge(&api.kind, name, obj, readiness)
        })
        .await
    }

    /// Request, wait for the acknowledgement, then wait for readiness.
    pub async fn reconcile(
        &self,
        api: &ApiResource,
        namespace: &str,
        name: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<DynamicObject, EngineError> {
        let stamp = self.request(api, namespace, name).await?;
        self.wait_handled(api, namespace, name, &stamp, timeout).await?;
        self.wait_ready(api, namespace, name, readiness, timeout).await
    }

    /// Reconcile the dev Bucket, then the dev Kustomization.
    ///
    /// When the Kustomization does not become healthy, the failing
    /// conditions of the objects in its inventory are logged before the
    /// error is returned.
    pub async fn reconcile_dev_kustomization(
        &self,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        tracing::info!(
            "Request reconciliation of {}, and {} ...",
            names::DEV_BUCKET,
            names::DEV_KUSTOMIZATION
        );
        self.reconcile(&api_resource::<Bucket>(), namespace, names::DEV_BUCKET, Readiness::Ready, timeout)
            .await?;

        let api = api_resource::<Kustomization>();
        let stamp = self.request(&api, namespace, names::DEV_KUSTOMIZATION).await?;
        self.wait_handled(&api, namespace, names::DEV_KUSTOMIZATION, &stamp, timeout).await?;
        match self
            .wait_ready(&api, namespace, names::DEV_KUSTOMIZATION, Readiness::ReadyAndHealthy, timeout)
            .await
        {
            Ok(_) => {
                tracing::info!("Reconciled {}", names::DEV_KUSTOMIZATION);
                Ok(())
            }
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(err) => {
                match self.cluster.get(&api, Some(namespace), names::DEV_KUSTOMIZATION).await {
                    Ok(ks) => match self.condition_messages(&ks).await {
                        Ok(messages) => {
                            for message in messages {
                                tracing::error!("{message}");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "could not collect condition messages"),
                    },
                    Err(e) => tracing::warn!(error = %e, "could not re-read kustomization"),
                }
                Err(err)
            }
        }
    }

    /// Reconcile the dev Bucket, then the dev HelmRelease.
    pub async fn reconcile_dev_helm_release(
        &self,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        tracing::info!(
            "Request reconciliation of {}, and {} ...",
            names::DEV_BUCKET,
            names::DEV_HELM_RELEASE
        );
        self.reconcile(&api_resource::<Bucket>(), namespace, names::DEV_BUCKET, Readiness::Ready, timeout)
            .await?;
        self.reconcile(
            &api_resource::<HelmRelease>(),
            namespace,
            names::DEV_HELM_RELEASE,
            Readiness::ReadyOrFail,
            timeout,
        )
        .await?;
        tracing::info!("Reconciled {}", names::DEV_HELM_RELEASE);
        Ok(())
    }

    /// Request reconciliation of the HelmChart Flux generates for a release
    /// (`<namespace>-<release>`) and wait for the acknowledgement.
    pub async fn reconcile_helm_chart(
        &self,
        namespace: &str,
        release: &str,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let api = api_resource::<HelmChart>();
        let name = format!("{namespace}-{release}");
        let cluster = &self.cluster;
        let chart_api = &api;
        let chart = name.as_str();
        // The chart appears only after the release has been reconciled once.
        poll_until(&self.cancel, &format!("HelmChart {namespace}/{name} to exist"), self.interval, timeout, move || async move {
            match cluster.get(chart_api, Some(namespace), chart).await {
                Ok(_) => Ok(Poll::Ready(())),
                Err(ClusterError::NotFound(_)) => Ok(Poll::pending()),
                Err(e) => Err(e.into()),
            }
        })
        .await?;
        let stamp = self.request(&api, namespace, &name).await?;
        self.wait_handled(&api, namespace, &name, &stamp, timeout).await?;
        Ok(())
    }

    /// `"Kind ns/name: message"` for every non-true condition of the
    /// objects in a Kustomization's inventory.
    pub async fn condition_messages(&self, ks: &DynamicObject) -> Result<Vec<String>, EngineError> {
        let status: KustomizationStatus = ks
            .data
            .get("status")
            .cloned()
            .and_then(|s| serde_json::from_value(s).ok())
            .unwrap_or_default();
        let inventory = status
            .inventory
            .ok_or_else(|| EngineError::NotReady("inventory is nil".to_string()))?;

        let mut gvks: BTreeMap<String, GroupVersionKind> = BTreeMap::new();
        for entry in &inventory.entries {
            let meta = ObjMetadata::parse(&entry.id)
                .map_err(|e| EngineError::Manifest(e.to_string()))?;
            let key = format!("{}_{}_{}", meta.group, entry.v, meta.kind);
            gvks.entry(key)
                .or_insert_with(|| GroupVersionKind::gvk(&meta.group, &entry.v, &meta.kind));
        }

        let ks_name = ks.metadata.name.clone().unwrap_or_default();
        let ks_namespace = ks.metadata.namespace.clone().unwrap_or_default();
        let selector = format!(
            "{}={ks_name},{}={ks_namespace}",
            labels::KUSTOMIZE_NAME,
            labels::KUSTOMIZE_NAMESPACE
        );

        let mut messages = Vec::new();
        for gvk in gvks.values() {
            let (api, _) = self.cluster.resolve(gvk).await?;
            for obj in self.cluster.list(&api, None, Some(&selector)).await? {
                messages.extend(failing_conditions(&gvk.kind, &obj));
            }
        }
        Ok(messages)
    }
}

fn is_conflict(err: &EngineError) -> bool {
    matches!(err, EngineError::Cluster(e) if e.is_conflict())
}

fn failing_conditions(kind: &str, obj: &DynamicObject) -> Vec<String> {
    let Some(conditions) = obj.data.pointer("/status/conditions").and_then(|c| c.as_array()) else {
        return Vec::new();
    };
    let reference = display_ref(
        Some(obj.metadata.namespace.as_deref().unwrap_or_default()),
        obj.metadata.name.as_deref().unwrap_or_default(),
    );
    conditions
        .iter()
        .filter(|c| c["status"].as_str().is_some_and(|s| s != "True"))
        .filter_map(|c| c["message"].as_str())
        .map(|message| format!("{kind} {reference}: {message}"))
        .collect()
}

fn judge(
    kind: &str,
    name: &str,
    obj: DynamicObject,
    readiness: Readiness,
) -> Result<Poll<DynamicObject>, EngineError> {
    let status = ReconcileStatus::of(&obj);
    let required: &[&str] = match readiness {
        Readiness::ReadyAndHealthy => &[READY, HEALTHY],
        Readiness::Ready | Readiness::ReadyOrFail => &[READY],
    };
    for condition_type in required {
        match status.condition(condition_type) {
            Some(c) if c.is_true() => {}
            Some(c) if readiness == Readiness::ReadyOrFail && c.status == "False" => {
                let message = c.message.clone().unwrap_or_default();
                tracing::error!("{kind} {name} is not ready: {message}");
                return Err(EngineError::NotReady(format!("{kind} {name} is not ready: {message}")));
            }
            Some(c) => {
                tracing::debug!(%kind, %name, condition = %condition_type, status = %c.status, "waiting");
                return Ok(Poll::Pending(c.message.clone()));
            }
            None => return Ok(Poll::pending_with(format!("no {condition_type} condition yet"))),
        }
    }
    Ok(Poll::Ready(obj))
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
