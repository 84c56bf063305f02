// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gitops-run get`

use anyhow::Result;
use clap::{Args, Subcommand};
use gr_core::CliConfig;
use gr_engine::session::SessionManager;

use crate::context;
use crate::exit_error::ExitError;
use crate::output::{format_config, format_sessions, OutputFormat};

#[derive(Args)]
pub struct GetArgs {
    #[command(subcommand)]
    pub command: GetCommand,

    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum GetCommand {
    /// Show the local CLI configuration
    Config,
    /// List sessions
    Sessions {
        /// Only sessions in this namespace
        #[arg(long)]
        namespace: Option<String>,
    },
}

pub async fn handle(args: GetArgs, context_flag: Option<&str>) -> Result<()> {
    match args.command {
        GetCommand::Config => {
            let config = CliConfig::load(&CliConfig::default_path()?)?;
            print!("{}", format_config(&config, args.output)?);
        }
        GetCommand::Sessions { namespace } => {
            // Read-only, so any context will do.
            let cluster = context::connect(&context::resolve(context_flag)?).await?;
            let sessions =
                SessionManager::new(cluster).list(namespace.as_deref()).await.map_err(ExitError::from)?;
            print!("{}", format_sessions(&sessions, args.output)?);
        }
    }
    Ok(())
}
