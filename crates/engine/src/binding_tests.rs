// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gr_adapters::{ClusterError, FakeCluster, Verb};
use serde_json::json;

const NS: &str = "flux-system";

fn params() -> BindingParams {
    BindingParams::new(NS, "./app", BucketCredentials::new("access", "secret-key"))
        .username("dev")
        .run_id(RunId::from_string("run-abc"))
}

#[test]
fn bucket_points_at_dev_server() {
    let bucket = dev_bucket(&params().bucket_port(9000));
    assert_eq!(bucket.spec.endpoint, "run-dev-bucket.gitops-run.svc.cluster.local:9000");
    assert_eq!(bucket.spec.provider, "generic");
    assert!(bucket.spec.insecure);
    assert_eq!(bucket.spec.interval, "720h");
    assert_eq!(bucket.spec.timeout.as_deref(), Some("5m"));
    assert_eq!(bucket.spec.secret_ref, Some(LocalObjectReference::new(names::DEV_BUCKET_CREDENTIALS)));

    let annotations = bucket.metadata.annotations.unwrap();
    assert_eq!(annotations[annotations::RUN_ID], "run-abc");
    assert_eq!(annotations[annotations::USERNAME], "dev");
}

#[test]
fn kustomization_prunes_and_waits() {
    let ks = dev_kustomization(&params(), false);
    assert!(ks.spec.prune);
    assert!(ks.spec.wait);
    assert_eq!(ks.spec.path, "./app");
    assert_eq!(ks.spec.source_ref, CrossNamespaceSourceReference::new("Bucket", names::DEV_BUCKET));
    assert!(ks.spec.decryption.is_none());
}

#[test]
fn helm_release_reads_values_from_chart_dir() {
    let hr = dev_helm_release(&params().kind(AutomationKind::Helm));
    assert_eq!(hr.spec.chart.spec.chart, "./app");
    assert_eq!(hr.spec.chart.spec.values_files, vec!["./app/values.yaml"]);
    assert_eq!(hr.spec.chart.spec.reconcile_strategy.as_deref(), Some("Revision"));
}

#[yare::parameterized(
    kustomize = { "kustomize", AutomationKind::Kustomize },
    ks = { "ks", AutomationKind::Kustomize },
    helm = { "helm", AutomationKind::Helm },
)]
fn automation_kind_parses(input: &str, expected: AutomationKind) {
    assert_eq!(input.parse::<AutomationKind>().unwrap(), expected);
}

#[test]
fn unknown_automation_kind_is_rejected() {
    assert!(matches!("terraform".parse::<AutomationKind>(), Err(EngineError::Precondition(_))));
}

#[tokio::test]
async fn setup_creates_secret_before_bucket_before_binding() {
    let cluster = FakeCluster::new();
    setup(&cluster, &params()).await.unwrap();
    assert_eq!(
        cluster.writes(),
        vec![
            format!("create Secret {NS}/{}", names::DEV_BUCKET_CREDENTIALS),
            format!("create Bucket {NS}/{}", names::DEV_BUCKET),
            format!("create Kustomization {NS}/{}", names::DEV_KUSTOMIZATION),
        ]
    );
    let secret = cluster.object("Secret", Some(NS), names::DEV_BUCKET_CREDENTIALS).unwrap();
    assert_eq!(secret["type"], "Opaque");
    // "access" and "secret-key", base64 encoded
    assert_eq!(secret["data"]["accesskey"], "YWNjZXNz");
    assert_eq!(secret["data"]["secretkey"], "c2VjcmV0LWtleQ==");
}

#[tokio::test]
async fn setup_wires_decryption_secret() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("key.agekey");
    std::fs::write(&key, "AGE-SECRET-KEY-1XYZ").unwrap();
    let cluster = FakeCluster::new();

    setup(&cluster, &params().decryption_key_file(key)).await.unwrap();

    let secret = cluster.object("Secret", Some(NS), names::DEV_DECRYPTION_SECRET).unwrap();
    // base64("AGE-SECRET-KEY-1XYZ")
    assert_eq!(secret["data"]["age.agekey"], "QUdFLVNFQ1JFVC1LRVktMVhZWg==");
    let ks = cluster.object("Kustomization", Some(NS), names::DEV_KUSTOMIZATION).unwrap();
    assert_eq!(
        ks["spec"]["decryption"],
        json!({"provider": "sops", "secretRef": {"name": names::DEV_DECRYPTION_SECRET}})
    );
    assert_eq!(cluster.writes()[0], format!("create Secret {NS}/{}", names::DEV_DECRYPTION_SECRET));
}

#[tokio::test]
async fn unknown_key_extension_fails_before_cluster_writes() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("key.pem");
    std::fs::write(&key, "-----BEGIN-----").unwrap();
    let cluster = FakeCluster::new();

    let err = setup(&cluster, &params().decryption_key_file(key)).await.unwrap_err();
    assert!(err.to_string().contains("failed determining decryption key type"), "{err}");
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn setup_adopts_objects_of_an_earlier_run() {
    let cluster = FakeCluster::new();
    setup(&cluster, &params()).await.unwrap();
    cluster.clear_calls();

    setup(&cluster, &params().run_id(RunId::from_string("run-other"))).await.unwrap();
    let bucket = cluster.object("Bucket", Some(NS), names::DEV_BUCKET).unwrap();
    assert_eq!(bucket["metadata"]["annotations"][annotations::RUN_ID], "run-other");
    assert_eq!(bucket["spec"]["bucketName"], names::DEV_BUCKET_NAME);
    assert!(cluster.writes().contains(&format!("patch Bucket {NS}/{}", names::DEV_BUCKET)), "{:?}", cluster.writes());
}

/// Whatever the shape of its spec, a binding nobody stamped is reported.
#[tokio::test]
async fn foreign_binding_is_a_name_collision() {
    let specs = [
        json!({"path": "./prod"}),
        json!(null),
        json!({"interval": "10m", "path": "./prod", "prune": true, "sourceRef": {"kind": "GitRepository", "name": "flux-system"}}),
    ];
    for spec in specs {
        let cluster = FakeCluster::new();
        cluster.insert(&json!({
            "apiVersion": "kustomize.toolkit.fluxcd.io/v1",
            "kind": "Kustomization",
            "metadata": {"name": names::DEV_KUSTOMIZATION, "namespace": NS},
            "spec": spec
        }));

        let err = setup(&cluster, &params()).await.unwrap_err();
        assert!(
            matches!(&err, EngineError::NameCollision { kind, .. } if kind == "Kustomization"),
            "{spec}: {err}"
        );
        assert!(cluster.writes().is_empty());
    }
}

#[tokio::test]
async fn foreign_bucket_is_a_name_collision() {
    let cluster = FakeCluster::new();
    cluster.insert(&json!({
        "apiVersion": "source.toolkit.fluxcd.io/v1beta2",
        "kind": "Bucket",
        "metadata": {"name": names::DEV_BUCKET, "namespace": NS},
        "spec": {"bucketName": "prod-artifacts"}
    }));

    let err = check_collisions(&cluster, NS, AutomationKind::Kustomize).await.unwrap_err();
    assert!(matches!(&err, EngineError::NameCollision { kind, .. } if kind == "Bucket"), "{err}");
    assert_eq!(err.to_string(), format!(
        "Bucket {NS}/{} already exists and was not created by GitOps Run; remove it or pick another namespace",
        names::DEV_BUCKET
    ));
}

#[tokio::test]
async fn teardown_deletes_binding_then_bucket_then_secrets() {
    let cluster = FakeCluster::new();
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("key.agekey");
    std::fs::write(&key, "AGE-SECRET-KEY-1XYZ").unwrap();
    let params = params().kind(AutomationKind::Helm).decryption_key_file(key);
    setup(&cluster, &params).await.unwrap();
    cluster.clear_calls();

    teardown(&cluster, NS, AutomationKind::Helm, Owner::Run(&params.run_id)).await.unwrap();
    assert_eq!(
        cluster.writes(),
        vec![
            format!("delete HelmRelease {NS}/{}", names::DEV_HELM_RELEASE),
            format!("delete Bucket {NS}/{}", names::DEV_BUCKET),
            format!("delete Secret {NS}/{}", names::DEV_DECRYPTION_SECRET),
            format!("delete Secret {NS}/{}", names::DEV_BUCKET_CREDENTIALS),
        ]
    );
    assert!(!cluster.exists("Bucket", Some(NS), names::DEV_BUCKET));
}

#[tokio::test]
async fn teardown_keeps_objects_it_does_not_own() {
    let cluster = FakeCluster::new();
    setup(&cluster, &params()).await.unwrap();
    cluster.insert(&json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": names::DEV_DECRYPTION_SECRET, "namespace": NS},
        "data": {}
    }));
    cluster.clear_calls();

    let stranger = RunId::from_string("run-zzz");
    teardown(&cluster, NS, AutomationKind::Kustomize, Owner::Run(&stranger)).await.unwrap();
    assert!(cluster.writes().is_empty(), "{:?}", cluster.writes());

    teardown(&cluster, NS, AutomationKind::Kustomize, Owner::AnyRun).await.unwrap();
    assert!(!cluster.exists("Kustomization", Some(NS), names::DEV_KUSTOMIZATION));
    assert!(!cluster.exists("Secret", Some(NS), names::DEV_BUCKET_CREDENTIALS));
    assert!(cluster.exists("Secret", Some(NS), names::DEV_DECRYPTION_SECRET));
}

#[tokio::test]
async fn teardown_collects_errors_and_keeps_going() {
    let cluster = FakeCluster::new();
    setup(&cluster, &params()).await.unwrap();
    cluster.fail_next(Verb::Delete, "Bucket", ClusterError::Forbidden("token expired".into()));

    let err = teardown(&cluster, NS, AutomationKind::Kustomize, Owner::AnyRun).await.unwrap_err();
    match err {
        EngineError::Teardown(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].starts_with("Bucket run-dev-bucket"), "{}", errors[0]);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(!cluster.exists("Secret", Some(NS), names::DEV_BUCKET_CREDENTIALS));
    assert!(!cluster.exists("Kustomization", Some(NS), names::DEV_KUSTOMIZATION));
}
