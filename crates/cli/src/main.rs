// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gitops-run: sync a local directory into a cluster through Flux

mod color;
mod commands;
mod context;
mod exit_error;
mod logging;
mod output;
mod signals;

use clap::{ArgAction, Parser, Subcommand};

use crate::commands::{create, get, remove, run, set};
use crate::exit_error::ExitError;

/// Continuously sync a directory into a Kubernetes cluster through Flux
#[derive(Parser)]
#[command(name = "gitops-run", version, styles = color::styles(), args_override_self = true)]
pub struct Cli {
    /// Kube context to use instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sync a directory into the cluster and keep it in sync
    Run(run::RunArgs),
    /// Remove resources
    Remove(remove::RemoveArgs),
    /// Display resources and settings
    Get(get::GetArgs),
    /// Change settings
    Set(set::SetArgs),
    /// Create resources
    Create(create::CreateArgs),
    /// Print version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    let guard = logging::init(cli.verbose);

    let code = match execute(cli) {
        Ok(()) => exit_error::codes::SUCCESS,
        Err(err) => {
            let code = exit_error::exit_code(&err);
            let silent = err.downcast_ref::<ExitError>().is_some_and(|e| e.message.is_empty());
            if !silent {
                eprintln!("Error: {err:#}");
            }
            code
        }
    };
    // Flush the file log before exiting.
    drop(guard);
    std::process::exit(code);
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(commands::dispatch(cli))
}
