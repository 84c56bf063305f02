// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gitops-run run`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use gr_adapters::{KubeCluster, KubeForwarder, S3Store};
use gr_core::{generate_session_name, names, parse_duration, BucketCredentials, CliConfig};
use gr_engine::binding::AutomationKind;
use gr_engine::dashboard::{DashboardSpec, DEFAULT_NAME};
use gr_engine::run::DASHBOARD_SERVICE_PORT;
use gr_engine::session::{run_in_session, Session, SessionManager, SessionRun, DEFAULT_LOCAL_PORT};
use gr_engine::{EngineError, Run, RunOptions};
use tokio_util::sync::CancellationToken;

use crate::context;
use crate::exit_error::{codes, ExitError};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory to sync, relative to the current directory
    #[arg(default_value = ".")]
    pub path: String,

    /// Namespace of the Bucket and its Kustomization or HelmRelease
    #[arg(long, env = "FLUX_SYSTEM_NAMESPACE", default_value = names::FLUX_SYSTEM_NAMESPACE)]
    pub namespace: String,

    /// How long to wait for each step (e.g. 90s, 5m)
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Forward a port after each reconcile: port=HOST:CONTAINER,resource=KIND/NAME[,namespace=NS]
    #[arg(long)]
    pub port_forward: Option<String>,

    /// Local port for the dashboard
    #[arg(long, default_value_t = DASHBOARD_SERVICE_PORT)]
    pub dashboard_port: u16,

    /// Bcrypt hash of the dashboard admin password
    #[arg(long)]
    pub dashboard_hashed_password: Option<String>,

    /// Neither install nor forward the dashboard
    #[arg(long)]
    pub no_dashboard: bool,

    /// Root of the synced tree (defaults to the enclosing git repository)
    #[arg(long)]
    pub root_dir: Option<PathBuf>,

    /// SOPS decryption key (*.agekey or *.asc)
    #[arg(long)]
    pub decryption_key_file: Option<PathBuf>,

    /// Allow writes to this non-local context
    #[arg(long)]
    pub allow_k8s_context: Option<String>,

    /// Run inside an isolated session cluster
    #[arg(long, conflicts_with = "no_session")]
    pub session: bool,

    /// Run directly against the current context
    #[arg(long)]
    pub no_session: bool,

    /// Session name (generated when omitted)
    #[arg(long)]
    pub session_name: Option<String>,

    /// Namespace the session is installed into
    #[arg(long, default_value = "default")]
    pub session_namespace: String,

    /// Set on the child process of a session
    #[arg(long, hide = true)]
    pub x_session_name: Option<String>,

    /// Do not install anything besides the dev bucket and its binding
    #[arg(long)]
    pub no_bootstrap: bool,

    /// Leave the dev bucket and binding in place on exit
    #[arg(long)]
    pub skip_resource_cleanup: bool,

    /// Do not install the dashboard when none is found
    #[arg(long)]
    pub skip_dashboard_install: bool,

    /// Flux version expected on the cluster
    #[arg(long)]
    pub flux_version: Option<String>,

    /// Binding that reconciles the bucket: kustomize or helm
    #[arg(long, default_value = "kustomize")]
    pub automation_kind: AutomationKind,
}

impl RunArgs {
    fn hashed_password(&self) -> Option<&str> {
        self.dashboard_hashed_password.as_deref().filter(|h| !h.is_empty())
    }

    fn dashboard(&self, analytics: bool) -> Option<DashboardSpec> {
        if self.no_dashboard {
            return None;
        }
        let spec = DashboardSpec::new(DEFAULT_NAME, &self.namespace).username("admin").analytics(analytics);
        Some(match self.hashed_password() {
            Some(hash) => spec.password_hash(hash),
            None => spec,
        })
    }

    /// Engine options for a direct run.
    pub fn options(&self, cwd: PathBuf, analytics: bool) -> RunOptions {
        let mut options = RunOptions::new(cwd, &self.path)
            .namespace(&self.namespace)
            .timeout(self.timeout)
            .dashboard_port(self.dashboard_port)
            .install_dashboard(!self.no_bootstrap && !self.skip_dashboard_install)
            .automation_kind(self.automation_kind)
            .skip_resource_cleanup(self.skip_resource_cleanup);
        options.root_dir = self.root_dir.clone();
        options.port_forward = self.port_forward.clone();
        options.dashboard = self.dashboard(analytics);
        options.decryption_key_file = self.decryption_key_file.clone();
        options.flux_version = self.flux_version.clone();
        options
    }

    /// Session description for a session run.
    pub fn session(&self) -> Session {
        let name = self.session_name.clone().unwrap_or_else(generate_session_name);
        Session::new(name, &self.session_namespace)
            .flux_namespace(&self.namespace)
            .port_forwards(self.port_forward.iter().cloned().collect())
            .automation_kind(self.automation_kind)
            .dashboard_hashed_password(self.hashed_password().unwrap_or_default())
    }

    fn in_session(&self) -> bool {
        self.session && !self.no_session
    }
}

fn analytics_enabled() -> bool {
    match CliConfig::default_path().and_then(|p| CliConfig::load(&p)) {
        Ok(config) => config.analytics,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable CLI config");
            false
        }
    }
}

pub async fn handle(args: RunArgs, context_flag: Option<&str>, cancel: CancellationToken) -> Result<()> {
    if args.in_session() {
        return run_session(args, context_flag, cancel).await;
    }
    run_direct(args, context_flag, cancel).await
}

async fn run_direct(args: RunArgs, context_flag: Option<&str>, cancel: CancellationToken) -> Result<()> {
    let cluster = context::connect_checked(context_flag, args.allow_k8s_context.as_deref()).await?;
    if let Some(session) = &args.x_session_name {
        tracing::info!(session, "running inside session");
    }

    let credentials = BucketCredentials::default();
    let store = S3Store::new(&format!("http://localhost:{}", names::DEV_BUCKET_PORT), &credentials)?;
    let forwarder = KubeForwarder::new(cluster.clone());
    let cwd = std::env::current_dir()?;
    let options = args.options(cwd, analytics_enabled());

    let run = Run::new(cluster, forwarder, store, credentials, options)?;
    tracing::info!(run_id = %run.run_id(), "starting GitOps Run");

    let outcome = run.start(&cancel).await;
    let report = run.teardown().await;
    finish(outcome, report.into_result())
}

/// Combine the run outcome with teardown: the run's own error wins, then
/// leftovers from teardown.
fn finish(outcome: Result<(), EngineError>, teardown: Result<(), EngineError>) -> Result<()> {
    match (outcome, teardown) {
        (Ok(()) | Err(EngineError::Cancelled), Ok(())) => Ok(()),
        (Ok(()) | Err(EngineError::Cancelled), Err(e)) => Err(ExitError::from(e).into()),
        (Err(e), teardown) => {
            if let Err(leftover) = teardown {
                tracing::error!(error = %leftover, "cleanup was incomplete");
            }
            Err(ExitError::from(e).into())
        }
    }
}

async fn run_session(args: RunArgs, context_flag: Option<&str>, cancel: CancellationToken) -> Result<()> {
    let cluster = context::connect_checked(context_flag, args.allow_k8s_context.as_deref()).await?;
    let forwarder = KubeForwarder::new(cluster.clone());
    let manager = SessionManager::new(cluster).timeout(args.timeout);

    let run = SessionRun {
        session: args.session(),
        argv: std::env::args().collect(),
        program: std::env::current_exe()?,
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        local_port: DEFAULT_LOCAL_PORT,
        skip_cleanup: args.skip_resource_cleanup,
    };
    tracing::info!(session = %run.session.name, namespace = %run.session.namespace, "starting session");

    let code = run_in_session(&manager, &forwarder, &run, &cancel, |yaml, session_context| async move {
        KubeCluster::from_kubeconfig_yaml(&yaml, &session_context).await
    })
    .await
    .map_err(ExitError::from)?;

    if code != codes::SUCCESS {
        // The child already reported its own failure.
        return Err(ExitError::new(code, "").into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
