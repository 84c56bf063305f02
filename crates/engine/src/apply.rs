// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-stage server-side apply (C11).
//!
//! Cluster definitions (CRDs and Namespaces) go first and must settle
//! before anything that depends on them is sent.

use std::time::Duration;

use gr_adapters::cluster::display_ref;
use gr_adapters::Cluster;
use gr_core::names;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::poll::{poll_until, Poll};
use crate::EngineError;

const CRD_KIND: &str = "CustomResourceDefinition";
const CRD_GROUP: &str = "apiextensions.k8s.io";

const WORKLOAD_KINDS: &[&str] =
    &["Pod", "Deployment", "StatefulSet", "DaemonSet", "ReplicaSet", "Job", "CronJob"];

/// Parse a multi-document YAML stream. Empty documents are skipped; a
/// stream with no objects at all is [`EngineError::EmptyManifest`].
pub fn parse_manifests(stream: &[u8]) -> Result<Vec<DynamicObject>, EngineError> {
    let mut objects = Vec::new();
    for (index, doc) in serde_yaml::Deserializer::from_slice(stream).enumerate() {
        let value = serde_yaml::Value::deserialize(doc)
            .map_err(|e| EngineError::Manifest(format!("document {index}: {e}")))?;
        if value.is_null() {
            continue;
        }
        let json = serde_json::to_value(value)
            .map_err(|e| EngineError::Manifest(format!("document {index}: {e}")))?;
        for field in ["apiVersion", "kind"] {
            if !json[field].is_string() {
                return Err(EngineError::Manifest(format!("document {index}: missing {field}")));
            }
        }
        let obj: DynamicObject = serde_json::from_value(json)
            .map_err(|e| EngineError::Manifest(format!("document {index}: {e}")))?;
        objects.push(obj);
    }
    if objects.is_empty() {
        return Err(EngineError::EmptyManifest);
    }
    Ok(objects)
}

pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind, EngineError> {
    let types = obj
        .types
        .as_ref()
        .ok_or_else(|| EngineError::Manifest("object without apiVersion/kind".to_string()))?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

fn kind_of(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default()
}

/// CRDs and Namespaces.
pub fn is_cluster_definition(obj: &DynamicObject) -> bool {
    match obj.types.as_ref() {
        Some(t) if t.kind == CRD_KIND => t.api_version.starts_with(CRD_GROUP),
        Some(t) => t.kind == "Namespace" && t.api_version == "v1",
        None => false,
    }
}

fn default_protocol(ports: Option<&mut Value>) {
    let Some(Value::Array(ports)) = ports else { return };
    for port in ports {
        if let Value::Object(port) = port {
            port.entry("protocol").or_insert_with(|| Value::String("TCP".to_string()));
        }
    }
}

fn pod_spec_mut<'a>(kind: &str, data: &'a mut Value) -> Option<&'a mut Value> {
    match kind {
        "Pod" => data.get_mut("spec"),
        "CronJob" => data.pointer_mut("/spec/jobTemplate/spec/template/spec"),
        _ => data.pointer_mut("/spec/template/spec"),
    }
}

/// Fill in the defaults the API server would add, so a re-apply of the
/// same stream is a no-op.
pub fn normalize(obj: &mut DynamicObject) {
    let kind = kind_of(obj).to_string();
    if kind == "Service" {
        default_protocol(obj.data.pointer_mut("/spec/ports"));
    } else if WORKLOAD_KINDS.contains(&kind.as_str()) {
        let Some(spec) = pod_spec_mut(&kind, &mut obj.data) else { return };
        for list in ["containers", "initContainers"] {
            if let Some(Value::Array(containers)) = spec.get_mut(list) {
                for container in containers {
                    default_protocol(container.get_mut("ports"));
                }
            }
        }
    }
}

/// One applied object, as `Kind/namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetEntry {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl std::fmt::Display for ChangeSetEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, display_ref(self.namespace.as_deref(), &self.name))
    }
}

/// Applies manifest streams with a fixed field manager.
#[derive(Clone)]
pub struct Applier<C> {
    cluster: C,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<C: Cluster> Applier<C> {
    pub fn new(cluster: C) -> Self {
        Self {
            cluster,
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
            cancel: CancellationToken::new(),
        }
    }

    gr_core::setters! {
        set { interval: Duration, timeout: Duration, cancel: CancellationToken }
    }

    /// Parse, normalize and apply `stream` in two stages.
    pub async fn apply_stream(&self, stream: &[u8]) -> Result<Vec<ChangeSetEntry>, EngineError> {
        let mut objects = parse_manifests(stream)?;
        objects.iter_mut().for_each(normalize);
        let (definitions, rest): (Vec<_>, Vec<_>) =
            objects.into_iter().partition(is_cluster_definition);

        let mut changes = Vec::new();
        if !definitions.is_empty() {
            let mut applied = Vec::new();
            for obj in &definitions {
                let (api, entry) = self.apply_one(obj).await?;
                applied.push((api, entry.clone()));
                changes.push(entry);
            }
            self.wait_established(&applied).await?;
        }
        for obj in &rest {
            let (_, entry) = self.apply_one(obj).await?;
            changes.push(entry);
        }
        Ok(changes)
    }

    async fn apply_one(&self, obj: &DynamicObject) -> Result<(ApiResource, ChangeSetEntry), EngineError> {
        let gvk = gvk_of(obj)?;
        let (api, namespaced) = self.cluster.resolve(&gvk).await?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| EngineError::Manifest(format!("{} without metadata.name", gvk.kind)))?;
        let namespace = namespaced.then(|| obj.metadata.namespace.clone().unwrap_or_else(|| "default".to_string()));

        let mut obj = obj.clone();
        if namespaced {
            obj.metadata.namespace = namespace.clone();
        }
        self.cluster.apply(&api, namespace.as_deref(), &obj, names::FIELD_OWNER).await?;
        let entry = ChangeSetEntry { kind: gvk.kind, namespace, name };
        tracing::info!("{entry} configured");
        Ok((api, entry))
    }

    async fn wait_established(&self, applied: &[(ApiResource, ChangeSetEntry)]) -> Result<(), EngineError> {
        let cluster = &self.cluster;
        poll_until(&self.cancel, "cluster definitions to be established", self.interval, self.timeout, move || async move {
            for (api, entry) in applied {
                let obj = cluster.get(api, entry.namespace.as_deref(), &entry.name).await?;
                if let Some(message) = definition_pending(&entry.kind, &obj) {
                    return Ok(Poll::pending_with(format!("{entry}: {message}")));
                }
            }
            Ok(Poll::Ready(()))
        })
        .await
    }
}

fn definition_pending(kind: &str, obj: &DynamicObject) -> Option<String> {
    if kind == CRD_KIND {
        let conditions = obj.data["status"]["conditions"].as_array().cloned().unwrap_or_default();
        let established = conditions
            .iter()
            .any(|c| c["type"] == "Established" && c["status"] == "True");
        return (!established).then(|| "not established yet".to_string());
    }
    match obj.data["status"]["phase"].as_str() {
        Some("Terminating") => Some("namespace is terminating".to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod tests;
