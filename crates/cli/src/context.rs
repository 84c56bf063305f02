// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Which kube context a command talks to, and whether it may write there.

use gr_adapters::cluster::current_context;
use gr_adapters::KubeCluster;
use gr_core::names::is_local_context;

use crate::exit_error::ExitError;

/// `--context` when given, otherwise the kubeconfig's current context.
pub fn resolve(flag: Option<&str>) -> Result<String, ExitError> {
    flag.map(str::to_string)
        .or_else(current_context)
        .ok_or_else(|| ExitError::usage("no kube context selected; set current-context or pass --context"))
}

/// Writes are only allowed against local clusters, or against the one
/// context the user explicitly allowed.
pub fn check(context: &str, allowed: Option<&str>) -> Result<(), ExitError> {
    if is_local_context(context) || allowed == Some(context) {
        return Ok(());
    }
    Err(ExitError::usage(format!(
        "the current context {context:?} does not look like a local cluster; \
         pass --allow-k8s-context={context} to use it anyway"
    )))
}

pub async fn connect(context: &str) -> anyhow::Result<KubeCluster> {
    tracing::debug!(context, "connecting to cluster");
    Ok(KubeCluster::connect(Some(context)).await?)
}

/// Resolve, check and connect in one go.
pub async fn connect_checked(flag: Option<&str>, allowed: Option<&str>) -> anyhow::Result<KubeCluster> {
    let context = resolve(flag)?;
    check(&context, allowed)?;
    connect(&context).await
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
