// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[derive(Parser)]
struct Harness {
    #[command(flatten)]
    args: DashboardArgs,
}

fn parse(args: &[&str]) -> DashboardArgs {
    Harness::try_parse_from(std::iter::once("dashboard").chain(args.iter().copied())).unwrap().args
}

#[test]
fn spec_follows_flags() {
    let spec = parse(&[
        "ww-gitops",
        "--namespace=dev",
        "--version=4.0.0",
        "--admin-username=root",
        "--password-hash=$2a$10$xyz",
        "--image=ghcr.io/weaveworks/wego-app:v0.1",
    ])
    .spec(true);

    assert_eq!(spec.name, "ww-gitops");
    assert_eq!(spec.namespace, "dev");
    assert_eq!(spec.chart_version.as_deref(), Some("4.0.0"));
    assert_eq!(spec.username, "root");
    assert_eq!(spec.password_hash, "$2a$10$xyz");
    assert_eq!(spec.image.as_deref(), Some("ghcr.io/weaveworks/wego-app:v0.1"));
    assert!(spec.analytics);
}

#[test]
fn exported_manifests_name_the_release() {
    let args = parse(&["my-dash", "--namespace=dev", "--export"]);
    let objects = create_objects(&args.spec(false)).unwrap();
    assert!(objects.manifests.contains("kind: HelmRepository"), "{}", objects.manifests);
    assert!(objects.manifests.contains("kind: HelmRelease"));
    assert!(objects.manifests.contains("name: my-dash"));
}
