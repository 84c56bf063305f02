// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gr_adapters::FakeCluster;
use gr_core::test_support::arb_manifest;
use proptest::prelude::*;

const NS: &str = "flux-system";

fn spec() -> DashboardSpec {
    DashboardSpec::new(DEFAULT_NAME, NS)
}

#[yare::parameterized(
    bare = { "weave-gitops", "", "weave-gitops", "" },
    bare_with_tag = { "weave-gitops:v1", "", "weave-gitops", "v1" },
    registry = { "ghcr.io/weaveworks/wego-app:v0.20", "ghcr.io/weaveworks", "wego-app", "v0.20" },
    registry_without_tag = { "ghcr.io/weaveworks/wego-app", "ghcr.io/weaveworks", "wego-app", "latest" },
)]
fn image_references_split(input: &str, repository: &str, image: &str, tag: &str) {
    let parsed = parse_image_repository(input).unwrap();
    assert_eq!(parsed, ImageRef { repository: repository.into(), image: image.into(), tag: tag.into() });
}

#[yare::parameterized(
    empty_tag = { "image:" },
    empty_image = { ":tag" },
    too_many_colons = { "a:b:c" },
    trailing_slash = { "ghcr.io/weaveworks/" },
)]
fn bad_image_references_are_rejected(input: &str) {
    assert!(parse_image_repository(input).is_err(), "{input}");
}

#[yare::parameterized(
    nothing = { "", "", false, None },
    user_without_hash = { "admin", "", false, None },
    admin_user = { "admin", "$2a$10$hash", false, Some(r#"{"adminUser":{"create":true,"passwordHash":"$2a$10$hash","username":"admin"}}"#) },
    analytics = { "", "", true, Some(r#"{"WEAVE_GITOPS_FEATURE_TELEMETRY":"true"}"#) },
)]
fn values_carry_only_what_is_set(user: &str, hash: &str, analytics: bool, expected: Option<&str>) {
    let values = make_values(&spec().username(user).password_hash(hash).analytics(analytics)).unwrap();
    let expected: Option<Value> = expected.map(|e| serde_json::from_str(e).unwrap());
    assert_eq!(values, expected);
}

#[test]
fn values_include_image_and_overrides() {
    let mut overrides = Map::new();
    overrides.insert("replicaCount".into(), json!(2));
    let values = make_values(&spec().image("ghcr.io/acme/ui:v2").values_overrides(overrides))
        .unwrap()
        .unwrap();
    assert_eq!(values["image"], json!({"repository": "ghcr.io/acme/ui", "tag": "v2"}));
    assert_eq!(values["replicaCount"], 2);
}

#[test]
fn objects_render_as_two_document_stream() {
    let objects = create_objects(&spec().chart_version("4.0.0")).unwrap();
    let docs: Vec<&str> = objects.manifests.split("---\n").collect();
    assert_eq!(docs.len(), 2);
    assert!(docs[0].contains("kind: HelmRepository"));
    assert!(docs[0].contains(HELM_REPOSITORY_URL));
    assert!(docs[1].contains("kind: HelmRelease"));
    assert!(!objects.manifests.contains("status"));
    assert!(!objects.manifests.contains("creationTimestamp"));

    assert_eq!(objects.helm_release.spec.chart.spec.version.as_deref(), Some("4.0.0"));
    assert_eq!(objects.helm_release.spec.chart.spec.source_ref.name, DEFAULT_NAME);
    assert_eq!(objects.helm_repository.spec.type_.as_deref(), Some("oci"));
    assert_eq!(objects.helm_repository.spec.interval.as_deref(), Some("1h"));
}

#[test]
fn sanitize_removes_server_fields() {
    let doc = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n  creationTimestamp: null\nstatus: {}\ndata:\n  a: b\n";
    let out = sanitize(doc).unwrap();
    assert_eq!(out, "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\ndata:\n  a: b\n");
}

#[test]
fn sanitize_rejects_non_mappings() {
    assert!(sanitize("- a\n- b\n").is_err());
}

proptest! {
    #[test]
    fn sanitize_is_idempotent(manifest in arb_manifest()) {
        let rendered = serde_yaml::to_string(&manifest).unwrap();
        let once = sanitize(&rendered).unwrap();
        let twice = sanitize(&once).unwrap();
        prop_assert_eq!(&once, &twice);

        let parsed: Value = serde_yaml::from_str(&once).unwrap();
        prop_assert!(parsed.get("status").is_none());
        prop_assert!(parsed["metadata"].get("creationTimestamp").is_none());
    }
}

fn release(name: &str, chart: &str, repository: &str) -> Value {
    json!({
        "apiVersion": "helm.toolkit.fluxcd.io/v2beta1",
        "kind": "HelmRelease",
        "metadata": {"name": name, "namespace": NS},
        "spec": {
            "interval": "1h",
            "chart": {"spec": {"chart": chart, "sourceRef": {"kind": "HelmRepository", "name": repository}}}
        }
    })
}

fn dashboard(cluster: &FakeCluster) -> Dashboard<FakeCluster> {
    Dashboard::new(Reconciler::new(cluster.clone()).with_interval(Duration::from_millis(100)))
        .interval(Duration::from_millis(100))
}

#[tokio::test]
async fn detects_releases_by_chart() {
    let cluster = FakeCluster::new();
    cluster.insert(&release("ww-gitops", OSS_CHART, "ww-gitops"));
    cluster.insert(&release("mccp", ENTERPRISE_CHART, ENTERPRISE_REPOSITORY));
    cluster.insert(&release("podinfo", "podinfo", "podinfo"));

    let found = dashboard(&cluster).installed(NS).await.unwrap();
    assert_eq!(
        found,
        InstalledDashboard { oss: Some("ww-gitops".into()), enterprise: Some("mccp".into()) }
    );
}

#[tokio::test]
async fn falls_back_to_labelled_deployments() {
    let cluster = FakeCluster::new();
    cluster.insert(&json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": "wego",
            "namespace": NS,
            "labels": {"app.kubernetes.io/part-of": "weave-gitops", "app.kubernetes.io/name": "weave-gitops-oss"}
        },
        "spec": {"selector": {}, "template": {}}
    }));

    let found = dashboard(&cluster).installed(NS).await.unwrap();
    assert_eq!(found, InstalledDashboard { oss: Some("wego".into()), enterprise: None });
}

#[tokio::test]
async fn nothing_installed() {
    let found = dashboard(&FakeCluster::new()).installed(NS).await.unwrap();
    assert!(!found.any());
}

#[tokio::test(start_paused = true)]
async fn install_applies_repository_then_release() {
    let cluster = FakeCluster::new();
    let objects = create_objects(&spec()).unwrap();

    let changes = dashboard(&cluster).install(&objects).await.unwrap();
    let rendered: Vec<String> = changes.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["HelmRepository/flux-system/ww-gitops", "HelmRelease/flux-system/ww-gitops"]);
    assert!(cluster.exists("HelmRelease", Some(NS), DEFAULT_NAME));
}

#[tokio::test(start_paused = true)]
async fn reconcile_waits_for_chart_and_pod() {
    let cluster = FakeCluster::new().with_flux_controllers();
    cluster.insert(&json!({
        "apiVersion": "source.toolkit.fluxcd.io/v1beta2",
        "kind": "HelmChart",
        "metadata": {"name": "flux-system-ww-gitops", "namespace": NS},
        "spec": {"chart": OSS_CHART, "sourceRef": {"kind": "HelmRepository", "name": DEFAULT_NAME}}
    }));
    cluster.insert(&json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "ww-gitops-abc",
            "namespace": NS,
            "labels": {"app.kubernetes.io/instance": DEFAULT_NAME, "app.kubernetes.io/name": OSS_CHART}
        },
        "spec": {"containers": []},
        "status": {"phase": "Running", "conditions": [{"type": "Ready", "status": "True"}]}
    }));

    dashboard(&cluster).reconcile(DEFAULT_NAME, NS, Duration::from_secs(30)).await.unwrap();
    let chart = cluster.object("HelmChart", Some(NS), "flux-system-ww-gitops").unwrap();
    assert!(chart["status"]["lastHandledReconcileRequest"].is_string());
}

#[tokio::test(start_paused = true)]
async fn reconcile_times_out_without_ready_pod() {
    let cluster = FakeCluster::new().with_flux_controllers();
    cluster.insert(&json!({
        "apiVersion": "source.toolkit.fluxcd.io/v1beta2",
        "kind": "HelmChart",
        "metadata": {"name": "flux-system-ww-gitops", "namespace": NS},
        "spec": {"chart": OSS_CHART, "sourceRef": {"kind": "HelmRepository", "name": DEFAULT_NAME}}
    }));

    let err = dashboard(&cluster).reconcile(DEFAULT_NAME, NS, Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "timed out waiting for dashboard pod flux-system/ww-gitops: no running dashboard pod yet"
    );
}
