// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gitops-run remove run`

use anyhow::Result;
use clap::{Args, Subcommand};
use gr_adapters::KubeForwarder;
use gr_core::names;
use gr_engine::binding::AutomationKind;
use gr_engine::run::remove_resources;
use gr_engine::session::SessionManager;
use gr_engine::EngineError;

use crate::context;
use crate::exit_error::ExitError;

#[derive(Args)]
pub struct RemoveArgs {
    #[command(subcommand)]
    pub command: RemoveCommand,
}

#[derive(Subcommand)]
pub enum RemoveCommand {
    /// Remove a session, every session, or what a direct run left behind
    Run(RemoveRunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RemoveRunArgs {
    /// Session to remove
    pub session: Option<String>,

    /// Remove every session
    #[arg(long, conflicts_with_all = ["session", "no_session"])]
    pub all_sessions: bool,

    /// Remove the dev bucket and binding from the current context
    #[arg(long, conflicts_with = "session")]
    pub no_session: bool,

    /// Namespace of the sessions
    #[arg(long, default_value = "default")]
    pub session_namespace: String,

    /// Namespace of the Bucket and its binding
    #[arg(long, env = "FLUX_SYSTEM_NAMESPACE", default_value = names::FLUX_SYSTEM_NAMESPACE)]
    pub namespace: String,

    /// Allow writes to this non-local context
    #[arg(long)]
    pub allow_k8s_context: Option<String>,
}

/// What a `remove run` invocation targets.
#[derive(Debug, PartialEq, Eq)]
pub enum Target<'a> {
    Session(&'a str),
    AllSessions,
    Direct,
}

impl RemoveRunArgs {
    pub fn target(&self) -> Result<Target<'_>, ExitError> {
        match (&self.session, self.all_sessions, self.no_session) {
            (Some(name), false, false) => Ok(Target::Session(name)),
            (None, true, false) => Ok(Target::AllSessions),
            (None, false, true) => Ok(Target::Direct),
            _ => Err(ExitError::usage("name a session, or pass --all-sessions or --no-session")),
        }
    }
}

pub async fn handle(command: RemoveCommand, context_flag: Option<&str>) -> Result<()> {
    match command {
        RemoveCommand::Run(args) => remove_run(args, context_flag).await,
    }
}

async fn remove_run(args: RemoveRunArgs, context_flag: Option<&str>) -> Result<()> {
    let target = args.target()?;
    let cluster = context::connect_checked(context_flag, args.allow_k8s_context.as_deref()).await?;

    match target {
        Target::Direct => {
            let forwarder = KubeForwarder::new(cluster.clone());
            let kinds = [AutomationKind::Kustomize, AutomationKind::Helm];
            remove_resources(&cluster, &forwarder, &args.namespace, &kinds)
                .await
                .into_result()
                .map_err(ExitError::from)?;
            println!("Removed GitOps Run resources from {}", args.namespace);
        }
        Target::Session(name) => {
            let manager = SessionManager::new(cluster);
            manager.get(name, &args.session_namespace).await.map_err(ExitError::from)?;
            manager.remove(name, &args.session_namespace).await.map_err(ExitError::from)?;
            println!("Removed session {name}");
        }
        Target::AllSessions => {
            let manager = SessionManager::new(cluster);
            let sessions = manager.list(Some(&args.session_namespace)).await.map_err(ExitError::from)?;
            let mut errors = Vec::new();
            for session in &sessions {
                match manager.remove(&session.name, &session.namespace).await {
                    Ok(()) => println!("Removed session {}", session.name),
                    Err(e) => {
                        tracing::error!(session = %session.name, error = %e, "failed to remove session");
                        errors.push(format!("{}: {e}", session.name));
                    }
                }
            }
            if !errors.is_empty() {
                return Err(ExitError::from(EngineError::Teardown(errors)).into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "remove_tests.rs"]
mod tests;
