// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn flux_namespace_defaults_to_flux_system() {
    std::env::remove_var("FLUX_SYSTEM_NAMESPACE");
    assert_eq!(flux_system_namespace(), "flux-system");
}

#[test]
#[serial]
fn flux_namespace_honours_override() {
    std::env::set_var("FLUX_SYSTEM_NAMESPACE", "gitops");
    assert_eq!(flux_system_namespace(), "gitops");
    std::env::set_var("FLUX_SYSTEM_NAMESPACE", "");
    assert_eq!(flux_system_namespace(), "flux-system");
    std::env::remove_var("FLUX_SYSTEM_NAMESPACE");
}

#[test]
#[serial]
fn schema_dirs_live_under_cache_root() {
    std::env::set_var("GITOPS_CACHE_DIR", "/tmp/cache");
    assert_eq!(flux_schema_dir(), Some(PathBuf::from("/tmp/cache/.gitops/flux/schemas")));
    assert_eq!(kube_schema_cache_dir(), Some(PathBuf::from("/tmp/cache/.gitops/schema-cache")));
    std::env::remove_var("GITOPS_CACHE_DIR");
}

#[test]
#[serial]
fn poll_interval_parses_millis() {
    std::env::set_var("GITOPS_RUN_POLL_MS", "20");
    assert_eq!(poll_interval(), Duration::from_millis(20));
    std::env::set_var("GITOPS_RUN_POLL_MS", "soon");
    assert_eq!(poll_interval(), Duration::from_millis(1500));
    std::env::remove_var("GITOPS_RUN_POLL_MS");
}
