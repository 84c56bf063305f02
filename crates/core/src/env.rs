// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.

use std::path::PathBuf;
use std::time::Duration;

use crate::names;

/// Namespace Flux is installed into: FLUX_SYSTEM_NAMESPACE > flux-system
pub fn flux_system_namespace() -> String {
    std::env::var("FLUX_SYSTEM_NAMESPACE")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| names::FLUX_SYSTEM_NAMESPACE.to_string())
}

/// Directory holding the local CLI config: GITOPS_CONFIG_DIR > platform config dir
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("GITOPS_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir()
}

/// User cache root: GITOPS_CACHE_DIR > platform cache dir
pub fn cache_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("GITOPS_CACHE_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::cache_dir()
}

/// Downloaded Flux CRD schemas used by the manifest validator.
pub fn flux_schema_dir() -> Option<PathBuf> {
    cache_dir().map(|d| d.join(".gitops").join("flux").join("schemas"))
}

/// Kubernetes schema cache.
pub fn kube_schema_cache_dir() -> Option<PathBuf> {
    cache_dir().map(|d| d.join(".gitops").join("schema-cache"))
}

/// Optional directory for rolling log files.
pub fn log_dir() -> Option<PathBuf> {
    std::env::var("GITOPS_RUN_LOG_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Readiness poll interval (default 1.5s, configurable via `GITOPS_RUN_POLL_MS`).
pub fn poll_interval() -> Duration {
    std::env::var("GITOPS_RUN_POLL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(1500))
}

/// Image for the dev bucket server (GITOPS_RUN_BUCKET_IMAGE > bundled default).
pub fn bucket_server_image() -> String {
    std::env::var("GITOPS_RUN_BUCKET_IMAGE")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| names::BUCKET_SERVER_IMAGE.to_string())
}

/// Name reported in the `username` annotation.
pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
