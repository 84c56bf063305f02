// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flux version discovery (C9).

use gr_adapters::{Cluster, ClusterError, ClusterExt};
use gr_core::env;
use gr_core::names::labels;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;

use crate::EngineError;

const SOURCE_CONTROLLER: &str = "source-controller";

/// Source-controller image tag to the Flux release that shipped it. Only the
/// main release of each line is listed.
const SOURCE_TO_FLUX: &[(&str, &str)] = &[
    ("v1.0.0-rc.1", "v2.0.0-rc.1"),
    ("v0.36.1", "v0.41.2"),
    ("v0.36.0", "v0.41.0"),
    ("v0.35.1", "v0.40.0"),
    ("v0.35.0", "v0.40.0"),
    ("v0.34.0", "v0.39.0"),
    ("v0.33.0", "v0.38.0"),
    ("v0.32.1", "v0.37.0"),
    ("v0.31.0", "v0.36.0"),
    ("v0.30.0", "v0.35.0"),
    ("v0.29.0", "v0.34.0"),
    ("v0.28.0", "v0.33.0"),
    ("v0.27.0", "v0.33.0"),
    ("v0.26.1", "v0.32.0"),
    ("v0.26.0", "v0.32.0"),
];

pub fn flux_for_source_version(source_version: &str) -> Option<&'static str> {
    SOURCE_TO_FLUX.iter().find(|(s, _)| *s == source_version).map(|(_, f)| *f)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluxVersion {
    pub version: String,
    pub namespace: String,
    /// Set when the version was derived from the source-controller image.
    pub source_version: Option<String>,
    pub guessed: bool,
}

fn has_version(ns: &Namespace) -> bool {
    ns.labels().get(labels::VERSION).is_some_and(|v| !v.is_empty())
}

/// Find the Flux installation and its version.
///
/// A `part-of=flux` namespace with a version label wins; otherwise the first
/// `part-of=flux` namespace is used and the version is guessed from its
/// source-controller image. The configured Flux namespace is only consulted
/// when no namespace carries the label.
pub async fn discover<C: Cluster>(cluster: &C) -> Result<FluxVersion, EngineError> {
    tracing::info!("Getting Flux version ...");
    let selector = format!("{}=flux", labels::PART_OF);
    let mut namespaces: Vec<Namespace> = cluster.list_typed(None, Some(&selector)).await?;
    let labelled = match namespaces.iter().position(has_version) {
        Some(i) => Some(namespaces.swap_remove(i)),
        None => namespaces.into_iter().next(),
    };

    let namespace = match labelled {
        Some(ns) => ns,
        None => {
            let fallback = env::flux_system_namespace();
            match cluster.get_typed::<Namespace>(None, &fallback).await {
                Ok(ns) => ns,
                Err(ClusterError::NotFound(_)) => {
                    return Err(EngineError::Precondition(format!(
                        "Flux is not installed: no namespace labelled {selector} and no {fallback} namespace"
                    )))
                }
                Err(e) => return Err(e.into()),
            }
        }
    };
    let name = namespace.name_any();

    if let Some(version) = namespace.labels().get(labels::VERSION).filter(|v| !v.is_empty()) {
        return Ok(FluxVersion {
            version: version.clone(),
            namespace: name,
            source_version: None,
            guessed: false,
        });
    }

    let deployment: Deployment = match cluster.get_typed(Some(&name), SOURCE_CONTROLLER).await {
        Ok(d) => d,
        Err(ClusterError::NotFound(_)) => {
            return Err(EngineError::Precondition(format!(
                "Flux is not installed: no {SOURCE_CONTROLLER} deployment in namespace {name}"
            )))
        }
        Err(e) => return Err(e.into()),
    };
    let image = deployment
        .spec
        .and_then(|s| s.template.spec)
        .and_then(|s| s.containers.into_iter().next())
        .and_then(|c| c.image)
        .filter(|i| !i.is_empty())
        .ok_or_else(|| EngineError::Precondition(format!("no image on {SOURCE_CONTROLLER} deployment")))?;
    let source_version = image.rsplit(':').next().unwrap_or_default().to_string();
    let version = flux_for_source_version(&source_version).ok_or_else(|| {
        EngineError::Precondition(format!(
            "unable to determine the Flux version from {SOURCE_CONTROLLER} {source_version}"
        ))
    })?;

    Ok(FluxVersion {
        version: version.to_string(),
        namespace: name,
        source_version: Some(source_version),
        guessed: true,
    })
}

#[cfg(test)]
#[path = "flux_version_tests.rs"]
mod tests;
