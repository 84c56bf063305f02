// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source and binding provisioning (C3).
//!
//! One Run owns exactly one `Bucket` and one binding (`Kustomization` or
//! `HelmRelease`) in the target namespace, plus the credentials Secret the
//! Bucket reads and an optional SOPS decryption Secret.
//!
//! All four carry the run-id annotation. An object of the same name without
//! it belongs to someone else: [`setup`] refuses to run next to it and
//! [`teardown`] never deletes it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gr_adapters::flux::{
    self, Bucket, BucketSpec, CrossNamespaceSourceReference, Decryption, HelmChartTemplate,
    HelmChartTemplateSpec, HelmRelease, HelmReleaseSpec, Kustomization, KustomizationSpec,
    LocalObjectReference,
};
use gr_adapters::cluster::{api_resource, display_ref};
use gr_adapters::{Cluster, ClusterError, ClusterExt};
use gr_core::names::{self, annotations};
use gr_core::{format_duration, BucketCredentials, DecryptionMaterial, RunId};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::ApiResource;
use kube::Resource;
use serde_json::json;

use crate::EngineError;

/// Polling interval of the Bucket and binding. Reconciliation is driven by
/// explicit requests, so the controllers should practically never poll.
pub const DEV_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Which binding reconciles the bucket contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutomationKind {
    #[default]
    Kustomize,
    Helm,
}

gr_core::simple_display! {
    AutomationKind {
        Kustomize => "kustomize",
        Helm => "helm",
    }
}

impl FromStr for AutomationKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kustomize" | "ks" => Ok(Self::Kustomize),
            "helm" => Ok(Self::Helm),
            other => Err(EngineError::Precondition(format!(
                "unsupported automation kind {other:?}: expected kustomize or helm"
            ))),
        }
    }
}

impl AutomationKind {
    /// Name of the binding object.
    pub fn binding_name(self) -> &'static str {
        match self {
            Self::Kustomize => names::DEV_KUSTOMIZATION,
            Self::Helm => names::DEV_HELM_RELEASE,
        }
    }

    pub fn binding_kind(self) -> &'static str {
        match self {
            Self::Kustomize => "Kustomization",
            Self::Helm => "HelmRelease",
        }
    }
}

/// Inputs of [`setup`].
#[derive(Debug, Clone)]
pub struct BindingParams {
    pub namespace: String,
    /// Bucket-relative path, e.g. `./app`.
    pub path: String,
    pub timeout: Duration,
    pub bucket_port: u16,
    pub run_id: RunId,
    pub username: String,
    pub credentials: BucketCredentials,
    pub decryption_key_file: Option<PathBuf>,
    pub kind: AutomationKind,
}

impl BindingParams {
    pub fn new(namespace: impl Into<String>, path: impl Into<String>, credentials: BucketCredentials) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.into(),
            timeout: Duration::from_secs(5 * 60),
            bucket_port: names::DEV_BUCKET_PORT,
            run_id: RunId::new(),
            username: gr_core::env::username(),
            credentials,
            decryption_key_file: None,
            kind: AutomationKind::default(),
        }
    }

    gr_core::setters! {
        into { username: String }
        set { timeout: Duration, bucket_port: u16, run_id: RunId, kind: AutomationKind }
        option { decryption_key_file: PathBuf }
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        flux::annotations([
            (annotations::DESCRIPTION, annotations::TEMPORARY_DESCRIPTION.to_string()),
            (annotations::RUN_ID, self.run_id.to_string()),
            (annotations::USERNAME, self.username.clone()),
        ])
    }

    fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            annotations: Some(self.annotations()),
            ..Default::default()
        }
    }

    fn stamped(&self, mut secret: Secret) -> Secret {
        secret.metadata.annotations = Some(self.annotations());
        secret
    }
}

fn run_id_of(meta: &ObjectMeta) -> Option<&str> {
    meta.annotations.as_ref()?.get(annotations::RUN_ID).map(String::as_str)
}

/// Whose objects [`teardown`] may delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner<'a> {
    /// Objects stamped with this run id.
    Run(&'a RunId),
    /// Objects stamped by any run, for cleanup without a run id at hand.
    AnyRun,
}

impl Owner<'_> {
    fn owns(self, meta: &ObjectMeta) -> bool {
        match (self, run_id_of(meta)) {
            (_, None) => false,
            (Owner::AnyRun, Some(_)) => true,
            (Owner::Run(id), Some(found)) => found == id.as_str(),
        }
    }
}

/// The objects a run keeps in its namespace, in deletion order.
fn managed(kind: AutomationKind) -> [(ApiResource, &'static str); 4] {
    let binding = match kind {
        AutomationKind::Kustomize => api_resource::<Kustomization>(),
        AutomationKind::Helm => api_resource::<HelmRelease>(),
    };
    [
        (binding, kind.binding_name()),
        (api_resource::<Bucket>(), names::DEV_BUCKET),
        (api_resource::<Secret>(), names::DEV_DECRYPTION_SECRET),
        (api_resource::<Secret>(), names::DEV_BUCKET_CREDENTIALS),
    ]
}

/// In-cluster endpoint of the dev bucket server.
pub fn bucket_endpoint(port: u16) -> String {
    format!("{}.{}.svc.cluster.local:{port}", names::DEV_BUCKET, names::RUN_NAMESPACE)
}

/// Opaque Secret holding the bucket credentials.
pub fn credentials_secret(namespace: &str, credentials: &BucketCredentials) -> Secret {
    let data = BTreeMap::from([
        (names::ACCESS_KEY.to_string(), ByteString(credentials.access_key.clone().into_bytes())),
        (names::SECRET_KEY.to_string(), ByteString(credentials.secret_key.clone().into_bytes())),
    ]);
    Secret {
        metadata: ObjectMeta {
            name: Some(names::DEV_BUCKET_CREDENTIALS.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// Secret carrying SOPS key material under its well-known key.
pub fn decryption_secret(namespace: &str, material: &DecryptionMaterial) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(names::DEV_DECRYPTION_SECRET.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([(
            material.secret_key.to_string(),
            ByteString(material.bytes.clone()),
        )])),
        ..Default::default()
    }
}

pub fn dev_bucket(params: &BindingParams) -> Bucket {
    let mut bucket = Bucket::new(
        names::DEV_BUCKET,
        BucketSpec {
            provider: "generic".to_string(),
            bucket_name: names::DEV_BUCKET_NAME.to_string(),
            endpoint: bucket_endpoint(params.bucket_port),
            insecure: true,
            interval: format_duration(DEV_INTERVAL),
            timeout: Some(format_duration(params.timeout)),
            secret_ref: Some(LocalObjectReference::new(names::DEV_BUCKET_CREDENTIALS)),
        },
    );
    *bucket.meta_mut() = params.metadata(names::DEV_BUCKET);
    bucket
}

fn bucket_ref() -> CrossNamespaceSourceReference {
    CrossNamespaceSourceReference::new("Bucket", names::DEV_BUCKET)
}

pub fn dev_kustomization(params: &BindingParams, decryption: bool) -> Kustomization {
    let mut ks = Kustomization::new(
        names::DEV_KUSTOMIZATION,
        KustomizationSpec {
            interval: format_duration(DEV_INTERVAL),
            path: params.path.clone(),
            prune: true,
            wait: true,
            timeout: Some(format_duration(params.timeout)),
            source_ref: bucket_ref(),
            decryption: decryption.then(|| Decryption {
                provider: "sops".to_string(),
                secret_ref: Some(LocalObjectReference::new(names::DEV_DECRYPTION_SECRET)),
            }),
            target_namespace: None,
        },
    );
    *ks.meta_mut() = params.metadata(names::DEV_KUSTOMIZATION);
    ks
}

pub fn dev_helm_release(params: &BindingParams) -> HelmRelease {
    let chart = params.path.trim_end_matches('/').to_string();
    let mut hr = HelmRelease::new(
        names::DEV_HELM_RELEASE,
        HelmReleaseSpec {
            interval: format_duration(DEV_INTERVAL),
            chart: HelmChartTemplate {
                spec: HelmChartTemplateSpec {
                    values_files: vec![format!("{chart}/values.yaml")],
                    chart,
                    version: None,
                    source_ref: bucket_ref(),
                    reconcile_strategy: Some("Revision".to_string()),
                },
            },
            timeout: Some(format_duration(params.timeout)),
            ..Default::default()
        },
    );
    *hr.meta_mut() = params.metadata(names::DEV_HELM_RELEASE);
    hr
}

/// An object left behind by an earlier run.
#[derive(Debug, Clone)]
pub struct Leftover {
    pub api: ApiResource,
    pub name: &'static str,
    pub run_id: String,
}

/// Fail with [`EngineError::NameCollision`] when an object a run would
/// create already exists without a run-id annotation. Objects stamped by a
/// run are returned for adoption.
///
/// Only reads metadata, so foreign objects of any shape are reported.
pub async fn check_collisions<C: Cluster>(
    cluster: &C,
    namespace: &str,
    kind: AutomationKind,
) -> Result<Vec<Leftover>, EngineError> {
    let mut leftovers = Vec::new();
    for (api, name) in managed(kind) {
        let obj = match cluster.get(&api, Some(namespace), name).await {
            Ok(obj) => obj,
            Err(ClusterError::NotFound(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        let Some(run_id) = run_id_of(&obj.metadata) else {
            return Err(EngineError::NameCollision {
                kind: api.kind.clone(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };
        leftovers.push(Leftover { run_id: run_id.to_string(), api, name });
    }
    Ok(leftovers)
}

/// Provision the decryption Secret, credentials Secret, Bucket and binding,
/// in that order.
///
/// Objects an earlier run left behind are kept as they are but re-stamped
/// with this run's id, so this run's teardown removes them.
pub async fn setup<C: Cluster>(cluster: &C, params: &BindingParams) -> Result<(), EngineError> {
    // Key material is validated before anything touches the cluster.
    let decryption = params
        .decryption_key_file
        .as_deref()
        .map(DecryptionMaterial::load)
        .transpose()?;
    let leftovers = check_collisions(cluster, &params.namespace, params.kind).await?;

    let ns = Some(params.namespace.as_str());
    for leftover in leftovers.iter().filter(|l| l.run_id != params.run_id.as_str()) {
        tracing::warn!(
            "{} {} was left behind by run {}; adopting it",
            leftover.api.kind,
            display_ref(ns, leftover.name),
            leftover.run_id
        );
        let patch = json!({"metadata": {"annotations": {(annotations::RUN_ID): params.run_id.as_str()}}});
        cluster.merge_patch(&leftover.api, ns, leftover.name, &patch).await?;
    }

    if let Some(material) = &decryption {
        let secret = params.stamped(decryption_secret(&params.namespace, material));
        if cluster.create_if_absent(ns, &secret).await? {
            tracing::info!(file = %material.filename, "created decryption secret {}", names::DEV_DECRYPTION_SECRET);
        }
    }

    let secret = params.stamped(credentials_secret(&params.namespace, &params.credentials));
    if cluster.create_if_absent(ns, &secret).await? {
        tracing::info!(namespace = %params.namespace, "created secret {}", names::DEV_BUCKET_CREDENTIALS);
    }
    if cluster.create_if_absent(ns, &dev_bucket(params)).await? {
        tracing::info!(namespace = %params.namespace, "created source {}", names::DEV_BUCKET);
    }

    let created = match params.kind {
        AutomationKind::Kustomize => {
            cluster.create_if_absent(ns, &dev_kustomization(params, decryption.is_some())).await?
        }
        AutomationKind::Helm => cluster.create_if_absent(ns, &dev_helm_release(params)).await?,
    };
    if created {
        tracing::info!(
            namespace = %params.namespace,
            "created {} {}",
            params.kind.binding_kind(),
            params.kind.binding_name()
        );
    } else {
        tracing::info!("{} {} already existed", params.kind.binding_kind(), params.kind.binding_name());
    }
    Ok(())
}

enum Removal {
    Deleted,
    Absent,
    Kept,
}

async fn delete_owned<C: Cluster>(
    cluster: &C,
    api: &ApiResource,
    namespace: &str,
    name: &str,
    owner: Owner<'_>,
) -> Result<Removal, ClusterError> {
    let ns = Some(namespace);
    let obj = match cluster.get(api, ns, name).await {
        Ok(obj) => obj,
        Err(ClusterError::NotFound(_)) => return Ok(Removal::Absent),
        Err(e) => return Err(e),
    };
    if !owner.owns(&obj.metadata) {
        return Ok(Removal::Kept);
    }
    match cluster.delete(api, ns, name).await {
        Ok(()) => Ok(Removal::Deleted),
        Err(ClusterError::NotFound(_)) => Ok(Removal::Absent),
        Err(e) => Err(e),
    }
}

/// Delete the binding, then the Bucket, then both Secrets, skipping any
/// object `owner` does not own. Every step runs even when an earlier one
/// fails; failures are collected.
pub async fn teardown<C: Cluster>(
    cluster: &C,
    namespace: &str,
    kind: AutomationKind,
    owner: Owner<'_>,
) -> Result<(), EngineError> {
    let mut errors = Vec::new();
    for (api, name) in managed(kind) {
        let what = format!("{} {name}", api.kind);
        match delete_owned(cluster, &api, namespace, name, owner).await {
            Ok(Removal::Deleted) => tracing::info!(namespace, "deleted {what}"),
            Ok(Removal::Absent) => tracing::debug!(namespace, "{what} already gone"),
            Ok(Removal::Kept) => tracing::warn!(namespace, "left {what} in place: it was not created by this run"),
            Err(e) => {
                tracing::error!(namespace, error = %e, "failed to delete {what}");
                errors.push(format!("{what}: {e}"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Teardown(errors))
    }
}

#[cfg(test)]
#[path = "binding_tests.rs"]
mod tests;
