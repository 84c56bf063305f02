// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    kind = { "kind-dev", true },
    k3d = { "k3d-local", true },
    minikube = { "minikube", true },
    docker_desktop = { "docker-desktop", true },
    docker_for_desktop = { "docker-for-desktop", true },
    eks = { "arn:aws:eks:eu-west-1:1234:cluster/prod", false },
    kind_suffix_only = { "my-kind", false },
    minikube_prefix = { "minikube-2", false },
)]
fn local_context_detection(context: &str, expected: bool) {
    assert_eq!(is_local_context(context), expected);
}

#[test]
fn session_selector_matches_both_labels() {
    assert_eq!(labels::session_selector(), "app=vcluster,app.kubernetes.io/part-of=gitops-run");
}
