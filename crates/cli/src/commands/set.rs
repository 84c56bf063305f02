// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gitops-run set`

use anyhow::Result;
use clap::{Args, Subcommand};
use gr_core::CliConfig;

use crate::exit_error::ExitError;

#[derive(Args)]
pub struct SetArgs {
    #[command(subcommand)]
    pub command: SetCommand,
}

#[derive(Subcommand)]
pub enum SetCommand {
    /// Change a CLI setting, e.g. `analytics=false`
    Config {
        /// KEY=VALUE
        #[arg(value_parser = parse_key_value)]
        setting: (String, String),
    },
}

pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

pub fn handle(command: SetCommand) -> Result<()> {
    match command {
        SetCommand::Config { setting: (key, value) } => {
            let path = CliConfig::default_path()?;
            let mut config = CliConfig::load(&path)?;
            config.set(&key, &value).map_err(|e| ExitError::usage(e.to_string()))?;
            config.save(&path)?;
            println!("Set {key} to {value}");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "set_tests.rs"]
mod tests;
