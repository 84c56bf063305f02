// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `create dashboard --export`

use crate::prelude::*;

#[test]
fn export_prints_repository_and_release() {
    let home = Home::new("kind-dev");
    let out = cli()
        .isolated(&home)
        .args(&["create", "dashboard", "ww-gitops", "--namespace=dev", "--export", "--password-hash=$2a$10$x"])
        .passes()
        .stdout_has("kind: HelmRepository")
        .stdout_has("kind: HelmRelease")
        .stdout_has("namespace: dev")
        .stdout_has("chart: weave-gitops");
    assert!(out.stdout.contains("\n---\n"), "{}", out.stdout);
    assert!(!out.stdout.contains("status:"), "{}", out.stdout);
}

#[test]
fn export_needs_no_cluster_even_when_remote() {
    let home = Home::new("prod-eu");
    cli().isolated(&home).args(&["create", "dashboard", "ww-gitops", "--export"]).passes();
}

#[test]
fn image_without_name_is_a_usage_error() {
    let home = Home::new("kind-dev");
    cli()
        .isolated(&home)
        .args(&["create", "dashboard", "ww-gitops", "--export", "--image=ghcr.io/:v1"])
        .fails_with(2)
        .stderr_has("invalid image reference");
}
