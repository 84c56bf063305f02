// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gr_adapters::{FakeCluster, FakeForwarder, ForwardError};
use std::time::Duration;

fn server(cluster: &FakeCluster, forwarder: &FakeForwarder) -> BucketServer<FakeCluster, FakeForwarder> {
    BucketServer::new(cluster.clone(), forwarder.clone()).image("example.com/bucket:test")
}

fn creds() -> BucketCredentials {
    BucketCredentials::new("access", "secret-key")
}

#[tokio::test(start_paused = true)]
async fn install_creates_objects_and_forwards_service() {
    let cluster = FakeCluster::new().with_workload_controllers();
    let forwarder = FakeForwarder::new();

    let handle = server(&cluster, &forwarder).install(&creds()).await.unwrap();

    assert_eq!(
        cluster.writes(),
        vec![
            "create Namespace gitops-run",
            "create Service gitops-run/run-dev-bucket",
            "create Secret gitops-run/run-dev-bucket-credentials",
            "create Deployment gitops-run/run-dev-bucket",
        ]
    );
    assert_eq!(handle.local_port(), names::DEV_BUCKET_PORT);
    let opened = forwarder.active();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].kind, ResourceKind::Service);
    assert_eq!(opened[0].name, names::DEV_BUCKET);
    assert_eq!(opened[0].namespace, names::RUN_NAMESPACE);
}

#[test]
fn deployment_reads_credentials_from_secret() {
    let d = deployment("img", 9000, 9443);
    let container = &d.spec.unwrap().template.spec.unwrap().containers[0];
    assert_eq!(container.image.as_deref(), Some("img"));
    assert_eq!(
        container.args.clone().unwrap(),
        vec!["--http-port=9000".to_string(), "--https-port=9443".to_string()]
    );
    let env = container.env.clone().unwrap();
    assert_eq!(env[0].name, "MINIO_ROOT_USER");
    let selector = env[0].value_from.clone().unwrap().secret_key_ref.unwrap();
    assert_eq!(selector.key, names::ACCESS_KEY);
}

#[test]
fn service_selects_bucket_pods() {
    let svc = service(9000, 9443).spec.unwrap();
    assert_eq!(svc.type_.as_deref(), Some("ClusterIP"));
    assert_eq!(svc.selector.unwrap()["app"], names::DEV_BUCKET);
    let ports: Vec<i32> = svc.ports.unwrap().iter().map(|p| p.port).collect();
    assert_eq!(ports, vec![9000, 9443]);
}

#[tokio::test(start_paused = true)]
async fn install_is_idempotent() {
    let cluster = FakeCluster::new().with_workload_controllers();
    let forwarder = FakeForwarder::new();
    let s = server(&cluster, &forwarder);

    drop(s.install(&creds()).await.unwrap());
    let _second = s.install(&creds()).await.unwrap();
    assert_eq!(cluster.names("Deployment"), vec![names::DEV_BUCKET]);
    assert_eq!(forwarder.opened().len(), 2);
    assert_eq!(forwarder.active().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unready_deployment_times_out_with_status() {
    let cluster = FakeCluster::new();
    let forwarder = FakeForwarder::new();
    let backoff = Backoff { steps: 3, ..Backoff::READINESS };

    let err = server(&cluster, &forwarder).backoff(backoff).install(&creds()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "timed out waiting for deployment gitops-run/run-dev-bucket: no status reported yet"
    );
    assert!(forwarder.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_install_stops_waiting_for_rollout() {
    let cluster = FakeCluster::new();
    let forwarder = FakeForwarder::new();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = server(&cluster, &forwarder).cancel(cancel).install(&creds()).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled), "{err}");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(forwarder.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn port_in_use_is_reported() {
    let cluster = FakeCluster::new().with_workload_controllers();
    let forwarder = FakeForwarder::new();
    forwarder.fail_next(ForwardError::PortInUse(9000));

    let err = server(&cluster, &forwarder).install(&creds()).await.unwrap_err();
    assert!(matches!(err, EngineError::Forward(ForwardError::PortInUse(9000))));
}

#[tokio::test(start_paused = true)]
async fn uninstall_waits_for_namespace_termination() {
    let cluster = FakeCluster::new().with_workload_controllers();
    let forwarder = FakeForwarder::new();
    let s = server(&cluster, &forwarder);
    drop(s.install(&creds()).await.unwrap());
    cluster.delay_deletion("Namespace", 2);

    let started = tokio::time::Instant::now();
    s.uninstall().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(!cluster.exists("Namespace", None, names::RUN_NAMESPACE));
    assert!(!cluster.exists("Deployment", Some(names::RUN_NAMESPACE), names::DEV_BUCKET));
}

#[tokio::test(start_paused = true)]
async fn uninstall_without_namespace_succeeds() {
    let cluster = FakeCluster::new();
    server(&cluster, &FakeForwarder::new()).uninstall().await.unwrap();
}
