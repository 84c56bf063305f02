// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gitops-run create dashboard`

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};
use gr_core::{names, parse_duration, CliConfig};
use gr_engine::dashboard::{create_objects, Dashboard, DashboardSpec};
use gr_engine::Reconciler;
use tokio_util::sync::CancellationToken;

use crate::context;
use crate::exit_error::ExitError;

#[derive(Args)]
pub struct CreateArgs {
    #[command(subcommand)]
    pub command: CreateCommand,
}

#[derive(Subcommand)]
pub enum CreateCommand {
    /// Create a HelmRepository and HelmRelease for the GitOps Dashboard
    Dashboard(DashboardArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DashboardArgs {
    /// Name of the HelmRepository and HelmRelease
    pub name: String,

    #[arg(long, env = "FLUX_SYSTEM_NAMESPACE", default_value = names::FLUX_SYSTEM_NAMESPACE)]
    pub namespace: String,

    /// Print the manifests instead of applying them
    #[arg(long)]
    pub export: bool,

    /// Chart version
    #[arg(long)]
    pub version: Option<String>,

    /// Dashboard image: [registry/path/]image[:tag]
    #[arg(long)]
    pub image: Option<String>,

    #[arg(long, default_value = "admin")]
    pub admin_username: String,

    /// Bcrypt hash of the admin password
    #[arg(long)]
    pub password_hash: Option<String>,

    /// How long to wait for the dashboard to become ready
    #[arg(long, default_value = "3m", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Allow writes to this non-local context
    #[arg(long)]
    pub allow_k8s_context: Option<String>,
}

impl DashboardArgs {
    pub fn spec(&self, analytics: bool) -> DashboardSpec {
        let mut spec = DashboardSpec::new(&self.name, &self.namespace)
            .username(&self.admin_username)
            .password_hash(self.password_hash.clone().unwrap_or_default())
            .analytics(analytics);
        spec.chart_version = self.version.clone();
        spec.image = self.image.clone();
        spec
    }
}

pub async fn handle(command: CreateCommand, context_flag: Option<&str>, cancel: CancellationToken) -> Result<()> {
    match command {
        CreateCommand::Dashboard(args) => create_dashboard(args, context_flag, cancel).await,
    }
}

async fn create_dashboard(args: DashboardArgs, context_flag: Option<&str>, cancel: CancellationToken) -> Result<()> {
    let analytics = CliConfig::default_path().and_then(|p| CliConfig::load(&p)).map(|c| c.analytics).unwrap_or(false);
    let objects = create_objects(&args.spec(analytics)).map_err(ExitError::from)?;

    if args.export {
        print!("{}", objects.manifests);
        return Ok(());
    }

    let cluster = context::connect_checked(context_flag, args.allow_k8s_context.as_deref()).await?;
    let dashboard = Dashboard::new(Reconciler::new(cluster).with_cancel(cancel));
    dashboard.install(&objects).await.map_err(ExitError::from)?;
    dashboard.reconcile(&args.name, &args.namespace, args.timeout).await.map_err(ExitError::from)?;
    println!("GitOps Dashboard {} is ready", args.name);
    Ok(())
}

#[cfg(test)]
#[path = "create_tests.rs"]
mod tests;
