// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

fn config_map(name: &str, labels: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
        ..Default::default()
    }
}

#[yare::parameterized(
    single = { "app=web", &[("app", "web")] },
    multiple = { "app=web, tier=front", &[("app", "web"), ("tier", "front")] },
    double_equals = { "app==web", &[("app", "web")] },
    junk_dropped = { "app,tier=x", &[("tier", "x")] },
)]
fn selector_parsing(input: &str, expected: &[(&str, &str)]) {
    let parsed = parse_selector(input);
    let expected: Vec<(String, String)> =
        expected.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    assert_eq!(parsed, expected);
}

#[test]
fn display_ref_formats() {
    assert_eq!(display_ref(Some("ns"), "a"), "ns/a");
    assert_eq!(display_ref(None, "a"), "a");
}

#[tokio::test]
async fn typed_round_trip_through_fake() {
    let cluster = FakeCluster::new();
    cluster.create_typed(Some("default"), &config_map("app", &[("app", "web")])).await.unwrap();

    let got: ConfigMap = cluster.get_typed(Some("default"), "app").await.unwrap();
    assert_eq!(got.metadata.namespace.as_deref(), Some("default"));
    assert_eq!(got.data.unwrap()["k"], "v");
}

#[tokio::test]
async fn create_if_absent_tolerates_existing() {
    let cluster = FakeCluster::new();
    assert!(cluster.create_if_absent(Some("default"), &config_map("a", &[])).await.unwrap());
    assert!(!cluster.create_if_absent(Some("default"), &config_map("a", &[])).await.unwrap());
}

#[tokio::test]
async fn delete_if_present_tolerates_missing() {
    let cluster = FakeCluster::new();
    assert!(!cluster.delete_if_present::<ConfigMap>(Some("default"), "a").await.unwrap());
}

#[tokio::test]
async fn get_opt_maps_not_found_to_none() {
    let cluster = FakeCluster::new();
    let got: Option<ConfigMap> = cluster.get_opt(Some("default"), "missing").await.unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn list_filters_by_namespace_and_labels() {
    let cluster = FakeCluster::new();
    cluster.create_typed(Some("a"), &config_map("one", &[("app", "web")])).await.unwrap();
    cluster.create_typed(Some("b"), &config_map("two", &[("app", "web")])).await.unwrap();
    cluster.create_typed(Some("a"), &config_map("three", &[("app", "db")])).await.unwrap();

    let in_a: Vec<ConfigMap> = cluster.list_typed(Some("a"), Some("app=web")).await.unwrap();
    assert_eq!(in_a.len(), 1);
    let everywhere: Vec<ConfigMap> = cluster.list_typed(None, Some("app=web")).await.unwrap();
    assert_eq!(everywhere.len(), 2);
}

#[tokio::test]
async fn stale_replace_conflicts() {
    let cluster = FakeCluster::new();
    cluster.create_typed(Some("default"), &config_map("a", &[])).await.unwrap();
    let api = api_resource::<ConfigMap>();

    let mut first = cluster.get(&api, Some("default"), "a").await.unwrap();
    let mut second = first.clone();
    first.metadata.labels = Some(BTreeMap::from([("x".into(), "1".into())]));
    cluster.replace(&api, Some("default"), &first).await.unwrap();

    second.metadata.labels = Some(BTreeMap::from([("x".into(), "2".into())]));
    let err = cluster.replace(&api, Some("default"), &second).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn injected_failure_fires_once() {
    let cluster = FakeCluster::new();
    cluster.fail_next(Verb::Create, "ConfigMap", ClusterError::Forbidden("nope".into()));

    let err = cluster.create_typed(Some("default"), &config_map("a", &[])).await.unwrap_err();
    assert_eq!(err, ClusterError::Forbidden("nope".into()));
    cluster.create_typed(Some("default"), &config_map("a", &[])).await.unwrap();
}

#[tokio::test]
async fn deleting_namespace_removes_contents() {
    let cluster = FakeCluster::new();
    let ns = Namespace {
        metadata: ObjectMeta { name: Some("apps".into()), ..Default::default() },
        ..Default::default()
    };
    cluster.create_typed(None, &ns).await.unwrap();
    cluster.create_typed(Some("apps"), &config_map("a", &[])).await.unwrap();

    cluster.delete_typed::<Namespace>(None, "apps").await.unwrap();
    assert!(!cluster.exists("ConfigMap", Some("apps"), "a"));
    assert!(!cluster.exists("Namespace", None, "apps"));
}

#[tokio::test]
async fn delayed_deletion_lingers_for_reads() {
    let cluster = FakeCluster::new();
    cluster.delay_deletion("ConfigMap", 2);
    cluster.create_typed(Some("default"), &config_map("a", &[])).await.unwrap();
    cluster.delete_typed::<ConfigMap>(Some("default"), "a").await.unwrap();

    let api = api_resource::<ConfigMap>();
    assert!(cluster.get(&api, Some("default"), "a").await.is_ok());
    assert!(cluster.get(&api, Some("default"), "a").await.is_ok());
    assert!(cluster.get(&api, Some("default"), "a").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn merge_patch_sets_and_removes_keys() {
    let cluster = FakeCluster::new();
    cluster.create_typed(Some("default"), &config_map("a", &[("keep", "1"), ("drop", "1")])).await.unwrap();
    let api = api_resource::<ConfigMap>();
    let patch = serde_json::json!({"metadata": {"labels": {"drop": null, "new": "2"}}});
    cluster.merge_patch(&api, Some("default"), "a", &patch).await.unwrap();

    let obj = cluster.object("ConfigMap", Some("default"), "a").unwrap();
    assert_eq!(obj["metadata"]["labels"], serde_json::json!({"keep": "1", "new": "2"}));
}

#[tokio::test]
async fn writes_are_recorded_in_order() {
    let cluster = FakeCluster::new();
    cluster.create_typed(Some("default"), &config_map("a", &[])).await.unwrap();
    cluster.delete_typed::<ConfigMap>(Some("default"), "a").await.unwrap();
    assert_eq!(cluster.writes(), vec!["create ConfigMap default/a", "delete ConfigMap default/a"]);
}

#[tokio::test]
async fn resolve_guesses_plural_and_scope() {
    let cluster = FakeCluster::new();
    let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
    let (api, namespaced) = cluster.resolve(&gvk).await.unwrap();
    assert_eq!(api.plural, "deployments");
    assert!(namespaced);

    let (_, namespaced) = cluster.resolve(&GroupVersionKind::gvk("", "v1", "Namespace")).await.unwrap();
    assert!(!namespaced);

    cluster.unregister_kind("Widget");
    let err = cluster.resolve(&GroupVersionKind::gvk("x.io", "v1", "Widget")).await.unwrap_err();
    assert!(err.is_not_found());
}
