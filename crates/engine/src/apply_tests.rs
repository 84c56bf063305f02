// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gr_adapters::{FakeCluster, Verb};

const STREAM: &str = r#"---
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: apps
spec:
  ports:
    - port: 80
---
apiVersion: v1
kind: Namespace
metadata:
  name: apps
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  group: example.com
---
"#;

#[test]
fn empty_stream_is_an_error() {
    assert!(matches!(parse_manifests(b""), Err(EngineError::EmptyManifest)));
    assert!(matches!(parse_manifests(b"---\n---\n"), Err(EngineError::EmptyManifest)));
}

#[test]
fn document_without_kind_is_rejected() {
    let err = parse_manifests(b"apiVersion: v1\nmetadata:\n  name: x\n").unwrap_err();
    assert_eq!(err.to_string(), "invalid manifest: document 0: missing kind");
}

#[test]
fn definitions_are_recognized() {
    let objects = parse_manifests(STREAM.as_bytes()).unwrap();
    let flags: Vec<bool> = objects.iter().map(is_cluster_definition).collect();
    assert_eq!(flags, vec![false, true, true]);
}

#[test]
fn gvk_splits_core_and_grouped_versions() {
    let objects = parse_manifests(STREAM.as_bytes()).unwrap();
    let core = gvk_of(&objects[0]).unwrap();
    assert_eq!((core.group.as_str(), core.version.as_str()), ("", "v1"));
    let crd = gvk_of(&objects[2]).unwrap();
    assert_eq!((crd.group.as_str(), crd.version.as_str()), ("apiextensions.k8s.io", "v1"));
}

#[test]
fn normalize_defaults_port_protocols() {
    let mut objects = parse_manifests(
        br#"
apiVersion: apps/v1
kind: Deployment
metadata: {name: web}
spec:
  template:
    spec:
      containers:
        - name: web
          ports: [{containerPort: 8080}, {containerPort: 53, protocol: UDP}]
"#,
    )
    .unwrap();
    normalize(&mut objects[0]);
    let ports = &objects[0].data["spec"]["template"]["spec"]["containers"][0]["ports"];
    assert_eq!(ports[0]["protocol"], "TCP");
    assert_eq!(ports[1]["protocol"], "UDP");
}

#[tokio::test(start_paused = true)]
async fn definitions_are_applied_and_settled_first() {
    let cluster = FakeCluster::new().with_workload_controllers();

    let changes = Applier::new(cluster.clone()).apply_stream(STREAM.as_bytes()).await.unwrap();

    let rendered: Vec<String> = changes.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec!["Namespace/apps", "CustomResourceDefinition/widgets.example.com", "Service/apps/web"]
    );
    let calls = cluster.calls();
    let last_get = calls.iter().rposition(|c| c.verb == Verb::Get).unwrap();
    let service_apply = calls.iter().position(|c| c.kind == "Service").unwrap();
    assert!(last_get < service_apply);

    let service = cluster.object("Service", Some("apps"), "web").unwrap();
    assert_eq!(service["spec"]["ports"][0]["protocol"], "TCP");
    assert_eq!(service["metadata"]["managedFields"][0]["manager"], names::FIELD_OWNER);
}

#[tokio::test(start_paused = true)]
async fn unestablished_crd_times_out() {
    let cluster = FakeCluster::new();
    let applier = Applier::new(cluster.clone());

    let err = applier.apply_stream(STREAM.as_bytes()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "timed out waiting for cluster definitions to be established: \
         CustomResourceDefinition/widgets.example.com: not established yet"
    );
    assert!(!cluster.exists("Service", Some("apps"), "web"));
}

#[tokio::test(start_paused = true)]
async fn namespaced_objects_default_to_default_namespace() {
    let cluster = FakeCluster::new();
    let changes = Applier::new(cluster.clone())
        .apply_stream(b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n")
        .await
        .unwrap();
    assert_eq!(changes[0].namespace.as_deref(), Some("default"));
    assert!(cluster.exists("ConfigMap", Some("default"), "settings"));
}

#[tokio::test(start_paused = true)]
async fn reapply_keeps_generation() {
    let cluster = FakeCluster::new().with_workload_controllers();
    let applier = Applier::new(cluster.clone());
    applier.apply_stream(STREAM.as_bytes()).await.unwrap();
    applier.apply_stream(STREAM.as_bytes()).await.unwrap();

    let service = cluster.object("Service", Some("apps"), "web").unwrap();
    assert_eq!(service["metadata"]["generation"], 1);
}
