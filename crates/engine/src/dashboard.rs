// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dashboard installer (C8).
//!
//! Renders the dashboard's HelmRepository and HelmRelease, applies them, and
//! waits until the chart is reconciled and the dashboard pod is ready.

use std::collections::BTreeMap;
use std::time::Duration;

use gr_adapters::cluster::api_resource;
use gr_adapters::flux::{
    annotations as annotation_map, CrossNamespaceSourceReference, HelmChart, HelmChartTemplate,
    HelmChartTemplateSpec, HelmRelease, HelmReleaseSpec, HelmRepository, HelmRepositorySpec,
};
use gr_adapters::forward::running_pod_by_labels;
use gr_adapters::{Cluster, ClusterExt};
use gr_core::format_duration;
use gr_core::names::{annotations, labels};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use serde_json::{json, Map, Value};

use crate::apply::{Applier, ChangeSetEntry};
use crate::poll::{poll_until, Poll};
use crate::reconcile::Readiness;
use crate::{EngineError, Reconciler};

pub const DEFAULT_NAME: &str = "ww-gitops";
pub const OSS_CHART: &str = "weave-gitops";
pub const ENTERPRISE_CHART: &str = "mccp";
pub const ENTERPRISE_REPOSITORY: &str = "weave-gitops-enterprise-charts";
pub const HELM_REPOSITORY_URL: &str = "oci://ghcr.io/weaveworks/charts";
pub const PART_OF: &str = "weave-gitops";
pub const OSS_APP_NAME: &str = "weave-gitops-oss";
pub const ENTERPRISE_APP_NAME: &str = "weave-gitops-enterprise";

const REPOSITORY_DESCRIPTION: &str =
    "This is the source location for the Weave GitOps Dashboard's helm chart.";
const RELEASE_DESCRIPTION: &str = "This is the Weave GitOps Dashboard.  It provides a simple way \
     to get insights into your GitOps workloads.";
const CHART_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What to render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSpec {
    pub name: String,
    pub namespace: String,
    pub username: String,
    pub password_hash: String,
    pub chart_version: Option<String>,
    /// `[registry/path/]image[:tag]`
    pub image: Option<String>,
    pub analytics: bool,
    /// Merged over the generated values, top-level keys win.
    pub values_overrides: Option<Map<String, Value>>,
}

impl DashboardSpec {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), ..Default::default() }
    }

    gr_core::setters! {
        into { username: String, password_hash: String }
        set { analytics: bool }
        option { chart_version: String, image: String, values_overrides: Map<String, Value> }
    }
}

/// An image reference split the way the chart's `image` values want it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub image: String,
    pub tag: String,
}

impl ImageRef {
    /// `repository/image`, or just `image` without a repository.
    pub fn full_repository(&self) -> String {
        format!("{}/{}", self.repository, self.image).trim_start_matches('/').to_string()
    }
}

/// Split `[repo/]image[:tag]`. A reference with a repository and no tag
/// defaults to `latest`; a bare image keeps an empty tag.
pub fn parse_image_repository(input: &str) -> Result<ImageRef, EngineError> {
    let invalid = |r: &str, i: &str, t: &str| {
        EngineError::Precondition(format!(
            "invalid image reference, repo = {r}, image = {i}, tag = {t}"
        ))
    };
    let parsed = match input.rsplit_once('/') {
        None => {
            let parts: Vec<&str> = input.split(':').collect();
            match parts.as_slice() {
                [image] => ImageRef { repository: String::new(), image: image.to_string(), tag: String::new() },
                [image, tag] => {
                    if image.is_empty() || tag.is_empty() {
                        return Err(invalid("", *image, *tag));
                    }
                    ImageRef { repository: String::new(), image: image.to_string(), tag: tag.to_string() }
                }
                _ => {
                    return Err(EngineError::Precondition(format!(
                        "invalid image reference, input = {input}"
                    )))
                }
            }
        }
        Some((repository, image_and_tag)) => {
            let mut parts = image_and_tag.split(':');
            let image = parts.next().unwrap_or_default();
            let tag = parts.next().unwrap_or("latest");
            ImageRef { repository: repository.to_string(), image: image.to_string(), tag: tag.to_string() }
        }
    };
    if parsed.image.is_empty() {
        return Err(invalid(&parsed.repository, &parsed.image, &parsed.tag));
    }
    Ok(parsed)
}

/// Chart values, or `None` when nothing needs setting.
pub fn make_values(spec: &DashboardSpec) -> Result<Option<Value>, EngineError> {
    let mut values = Map::new();
    if !spec.username.is_empty() && !spec.password_hash.is_empty() {
        values.insert(
            "adminUser".to_string(),
            json!({
                "create": true,
                "username": spec.username,
                "passwordHash": spec.password_hash,
            }),
        );
    }
    if spec.analytics {
        values.insert("WEAVE_GITOPS_FEATURE_TELEMETRY".to_string(), json!("true"));
    }
    if let Some(image) = spec.image.as_deref().filter(|i| !i.is_empty()) {
        let image = parse_image_repository(image)?;
        values.insert(
            "image".to_string(),
            json!({ "repository": image.full_repository(), "tag": image.tag }),
        );
    }
    if let Some(overrides) = &spec.values_overrides {
        values.extend(overrides.clone());
    }
    Ok((!values.is_empty()).then_some(Value::Object(values)))
}

pub fn helm_repository(spec: &DashboardSpec) -> HelmRepository {
    let mut repo = HelmRepository::new(
        &spec.name,
        HelmRepositorySpec {
            url: HELM_REPOSITORY_URL.to_string(),
            type_: Some("oci".to_string()),
            interval: Some(format_duration(CHART_INTERVAL)),
        },
    );
    repo.metadata.namespace = Some(spec.namespace.clone());
    repo.metadata.labels = Some(BTreeMap::from([
        (labels::NAME.to_string(), "weave-gitops-dashboard".to_string()),
        (labels::COMPONENT.to_string(), "ui".to_string()),
        (labels::PART_OF.to_string(), PART_OF.to_string()),
        (labels::CREATED_BY.to_string(), "weave-gitops-cli".to_string()),
    ]));
    repo.metadata.annotations =
        Some(annotation_map([(annotations::DESCRIPTION, REPOSITORY_DESCRIPTION.to_string())]));
    repo
}

pub fn helm_release(spec: &DashboardSpec) -> Result<HelmRelease, EngineError> {
    let mut release = HelmRelease::new(
        &spec.name,
        HelmReleaseSpec {
            interval: format_duration(CHART_INTERVAL),
            chart: HelmChartTemplate {
                spec: HelmChartTemplateSpec {
                    chart: OSS_CHART.to_string(),
                    version: spec.chart_version.clone().filter(|v| !v.is_empty()),
                    source_ref: CrossNamespaceSourceReference::new("HelmRepository", &spec.name),
                    ..Default::default()
                },
            },
            values: make_values(spec)?,
            ..Default::default()
        },
    );
    release.metadata.namespace = Some(spec.namespace.clone());
    release.metadata.annotations =
        Some(annotation_map([(annotations::DESCRIPTION, RELEASE_DESCRIPTION.to_string())]));
    Ok(release)
}

/// Drop server-populated fields (`status`, `metadata.creationTimestamp`)
/// from one YAML document.
pub fn sanitize(document: &str) -> Result<String, EngineError> {
    let mut value: serde_yaml::Value = serde_yaml::from_str(document)
        .map_err(|e| EngineError::Manifest(format!("failed to parse resource data: {e}")))?;
    let Some(root) = value.as_mapping_mut() else {
        return Err(EngineError::Manifest("resource is not a mapping".to_string()));
    };
    root.remove("status");
    if let Some(metadata) = root.get_mut("metadata").and_then(serde_yaml::Value::as_mapping_mut) {
        metadata.remove("creationTimestamp");
    }
    serde_yaml::to_string(&value)
        .map_err(|e| EngineError::Manifest(format!("failed to marshal resource: {e}")))
}

fn to_yaml<K: serde::Serialize>(obj: &K) -> Result<String, EngineError> {
    let rendered = serde_yaml::to_string(obj).map_err(|e| EngineError::Manifest(e.to_string()))?;
    sanitize(&rendered)
}

/// Rendered dashboard objects and their sanitized YAML stream.
#[derive(Debug, Clone)]
pub struct DashboardObjects {
    pub manifests: String,
    pub helm_repository: HelmRepository,
    pub helm_release: HelmRelease,
}

pub fn create_objects(spec: &DashboardSpec) -> Result<DashboardObjects, EngineError> {
    tracing::info!("Creating GitOps Dashboard objects ...");
    let helm_repository = helm_repository(spec);
    let helm_release = helm_release(spec)?;
    let manifests = format!("{}---\n{}", to_yaml(&helm_repository)?, to_yaml(&helm_release)?);
    Ok(DashboardObjects { manifests, helm_repository, helm_release })
}

/// Dashboards already present in a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledDashboard {
    pub oss: Option<String>,
    pub enterprise: Option<String>,
}

impl InstalledDashboard {
    pub fn any(&self) -> bool {
        self.oss.is_some() || self.enterprise.is_some()
    }
}

/// Installs and watches over the dashboard.
#[derive(Clone)]
pub struct Dashboard<C> {
    reconciler: Reconciler<C>,
    interval: Duration,
}

impl<C: Cluster> Dashboard<C> {
    pub fn new(reconciler: Reconciler<C>) -> Self {
        Self { reconciler, interval: Duration::from_millis(1500) }
    }

    gr_core::setters! {
        set { interval: Duration }
    }

    fn cluster(&self) -> &C {
        self.reconciler.cluster()
    }

    /// Look for dashboard HelmReleases first, then for labelled Deployments.
    pub async fn installed(&self, namespace: &str) -> Result<InstalledDashboard, EngineError> {
        let mut found = InstalledDashboard::default();
        let releases: Vec<HelmRelease> = self.cluster().list_typed(Some(namespace), None).await?;
        for release in &releases {
            let chart = &release.spec.chart.spec;
            if chart.chart == ENTERPRISE_CHART && chart.source_ref.name == ENTERPRISE_REPOSITORY {
                found.enterprise.get_or_insert_with(|| release.name_any());
            } else if chart.chart == OSS_CHART {
                found.oss.get_or_insert_with(|| release.name_any());
            }
        }
        if found.any() {
            return Ok(found);
        }

        let selector = format!("{}={PART_OF}", labels::PART_OF);
        let deployments: Vec<Deployment> =
            self.cluster().list_typed(Some(namespace), Some(&selector)).await?;
        for deployment in &deployments {
            match deployment.labels().get(labels::NAME).map(String::as_str) {
                Some(ENTERPRISE_APP_NAME) => {
                    found.enterprise.get_or_insert_with(|| deployment.name_any());
                }
                Some(OSS_APP_NAME) => {
                    found.oss.get_or_insert_with(|| deployment.name_any());
                }
                _ => {}
            }
        }
        Ok(found)
    }

    pub async fn install(&self, objects: &DashboardObjects) -> Result<Vec<ChangeSetEntry>, EngineError> {
        tracing::info!("Installing the GitOps Dashboard ...");
        Applier::new(self.cluster().clone())
            .cancel(self.reconciler.cancel_token().clone())
            .apply_stream(objects.manifests.as_bytes()).await
    }

    /// Reconcile the release's HelmChart, wait for it to be Ready, then
    /// wait for the dashboard pod.
    pub async fn reconcile(&self, name: &str, namespace: &str, timeout: Duration) -> Result<(), EngineError> {
        self.reconciler.reconcile_helm_chart(namespace, name, timeout).await?;
        let chart_api = api_resource::<HelmChart>();
        let chart = format!("{namespace}-{name}");
        self.reconciler.wait_ready(&chart_api, namespace, &chart, Readiness::Ready, timeout).await?;

        let selector = format!("{}={name},{}={OSS_CHART}", labels::INSTANCE, labels::NAME);
        let cluster = self.cluster();
        let selector = selector.as_str();
        poll_until(self.reconciler.cancel_token(), &format!("dashboard pod {namespace}/{name}"), self.interval, timeout, move || async move {
            let Some(pod) = running_pod_by_labels(cluster, namespace, selector).await? else {
                return Ok(Poll::pending_with("no running dashboard pod yet"));
            };
            let ready = pod
                .status
                .and_then(|s| s.conditions)
                .unwrap_or_default()
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True");
            Ok(if ready { Poll::Ready(()) } else { Poll::pending_with("dashboard pod is not ready") })
        })
        .await?;
        tracing::info!("GitOps Dashboard {name} is ready");
        Ok(())
    }
}

#[cfg(test)]
#[path = "dashboard_tests.rs"]
mod tests;
