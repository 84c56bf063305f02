// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn config(server: &str) -> String {
    format!(
        "apiVersion: v1
kind: Config
clusters:
- name: my-vcluster
  cluster:
    certificate-authority-data: Q0E=
    server: {server}
contexts:
- name: my-vcluster
  context:
    cluster: my-vcluster
    user: my-vcluster
current-context: my-vcluster
users:
- name: my-vcluster
  user:
    client-key-data: S0VZ
"
    )
}

#[test]
fn renames_everything_to_the_session() {
    let out = rewrite_kubeconfig(&config("https://localhost:8443"), "run-abc", 9100).unwrap();
    let doc: Value = serde_yaml::from_str(&out.yaml).unwrap();

    assert_eq!(doc["clusters"][0]["name"], "run-abc");
    assert_eq!(doc["clusters"][0]["cluster"]["server"], "https://localhost:9100");
    assert_eq!(doc["clusters"][0]["cluster"]["certificate-authority-data"], "Q0E=");
    assert_eq!(doc["users"][0]["name"], "run-abc");
    assert_eq!(doc["users"][0]["user"]["client-key-data"], "S0VZ");
    assert_eq!(doc["contexts"][0]["name"], "run-abc");
    assert_eq!(doc["contexts"][0]["context"]["cluster"], "run-abc");
    assert_eq!(doc["contexts"][0]["context"]["user"], "run-abc");
    assert_eq!(doc["current-context"], "run-abc");
}

#[yare::parameterized(
    explicit = { "https://localhost:8443", 8443 },
    other = { "https://10.0.0.1:6443/", 6443 },
    no_port = { "https://vcluster.local", 8443 },
    ipv6_no_port = { "https://[::1]", 8443 },
)]
fn remote_port_comes_from_server(server: &str, port: u16) {
    assert_eq!(rewrite_kubeconfig(&config(server), "s", 1).unwrap().remote_port, port);
}

#[test]
fn bad_port_is_rejected() {
    assert!(rewrite_kubeconfig(&config("https://localhost:http"), "s", 1).is_err());
}

#[test]
fn multiple_clusters_are_rejected() {
    let raw = "clusters:\n- name: a\n  cluster: {server: x}\n- name: b\n  cluster: {server: y}\nusers: []\ncontexts: []\n";
    let err = rewrite_kubeconfig(raw, "s", 1).unwrap_err();
    assert!(err.to_string().contains("expected exactly one entry in clusters, found 2"), "{err}");
}

#[test]
fn garbage_is_rejected() {
    assert!(rewrite_kubeconfig("- not\n- a config\n", "s", 1).is_err());
}
