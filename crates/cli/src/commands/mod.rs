// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod create;
pub mod get;
pub mod remove;
pub mod run;
pub mod set;

use anyhow::Result;

use crate::signals::cancel_on_signals;
use crate::{Cli, Command};

/// Version banner printed by `gitops-run version`.
pub fn version_text() -> String {
    format!(
        "Current Version: {}\nGitCommit: {}\nBuildTime: {}\n",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_HASH"),
        env!("BUILD_DATE"),
    )
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let context = cli.context.as_deref();
    match cli.command {
        Command::Run(args) => run::handle(args, context, cancel_on_signals()?).await,
        Command::Remove(args) => remove::handle(args.command, context).await,
        Command::Get(args) => get::handle(args, context).await,
        Command::Set(args) => set::handle(args.command),
        Command::Create(args) => create::handle(args.command, context, cancel_on_signals()?).await,
        Command::Version => {
            print!("{}", version_text());
            Ok(())
        }
    }
}
