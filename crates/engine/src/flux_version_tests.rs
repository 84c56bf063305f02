// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gr_adapters::FakeCluster;
use serde_json::json;

fn namespace(name: &str, labels: serde_json::Value) -> serde_json::Value {
    json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": name, "labels": labels}})
}

fn source_controller(ns: &str, image: &str) -> serde_json::Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "source-controller", "namespace": ns},
        "spec": {
            "selector": {},
            "template": {"spec": {"containers": [{"name": "manager", "image": image}]}}
        }
    })
}

#[tokio::test]
async fn version_label_wins() {
    let cluster = FakeCluster::new();
    cluster.insert(&namespace("flux", json!({"app.kubernetes.io/part-of": "flux"})));
    cluster.insert(&namespace(
        "gitops",
        json!({"app.kubernetes.io/part-of": "flux", "app.kubernetes.io/version": "v2.1.0"}),
    ));

    let found = discover(&cluster).await.unwrap();
    assert_eq!(
        found,
        FluxVersion { version: "v2.1.0".into(), namespace: "gitops".into(), source_version: None, guessed: false }
    );
}

#[tokio::test]
#[serial_test::serial]
async fn guesses_from_source_controller_image() {
    let cluster = FakeCluster::new();
    cluster.insert(&namespace("flux-system", json!({})));
    cluster.insert(&source_controller("flux-system", "ghcr.io/fluxcd/source-controller:v0.33.0"));

    let found = discover(&cluster).await.unwrap();
    assert_eq!(found.version, "v0.38.0");
    assert_eq!(found.source_version.as_deref(), Some("v0.33.0"));
    assert!(found.guessed);
}

#[tokio::test]
#[serial_test::serial]
async fn unknown_source_version_is_an_error() {
    let cluster = FakeCluster::new();
    cluster.insert(&namespace("flux-system", json!({})));
    cluster.insert(&source_controller("flux-system", "ghcr.io/fluxcd/source-controller:v9.9.9"));

    let err = discover(&cluster).await.unwrap_err();
    assert!(err.to_string().contains("v9.9.9"), "{err}");
}

#[tokio::test]
#[serial_test::serial]
async fn missing_flux_is_a_precondition_failure() {
    let err = discover(&FakeCluster::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)), "{err}");
    assert!(err.to_string().starts_with("Flux is not installed"));
}

#[tokio::test]
#[serial_test::serial]
async fn unversioned_flux_namespace_is_guessed_before_the_fallback() {
    let cluster = FakeCluster::new();
    cluster.insert(&namespace("flux", json!({"app.kubernetes.io/part-of": "flux"})));
    cluster.insert(&source_controller("flux", "ghcr.io/fluxcd/source-controller:v0.36.0"));

    let found = discover(&cluster).await.unwrap();
    assert_eq!(
        found,
        FluxVersion {
            version: "v0.41.0".into(),
            namespace: "flux".into(),
            source_version: Some("v0.36.0".into()),
            guessed: true,
        }
    );
}

#[tokio::test]
#[serial_test::serial]
async fn unversioned_flux_namespace_without_source_controller_is_reported() {
    let cluster = FakeCluster::new();
    cluster.insert(&namespace("flux", json!({"app.kubernetes.io/part-of": "flux"})));
    cluster.insert(&namespace("flux-system", json!({})));
    cluster.insert(&source_controller("flux-system", "ghcr.io/fluxcd/source-controller:v0.33.0"));

    let err = discover(&cluster).await.unwrap_err();
    assert_eq!(err.to_string(), "Flux is not installed: no source-controller deployment in namespace flux");
}

#[yare::parameterized(
    rc = { "v1.0.0-rc.1", Some("v2.0.0-rc.1") },
    patch = { "v0.36.1", Some("v0.41.2") },
    oldest = { "v0.26.0", Some("v0.32.0") },
    unknown = { "v0.1.0", None },
)]
fn source_versions_map_to_flux(source: &str, expected: Option<&str>) {
    assert_eq!(flux_for_source_version(source), expected);
}
