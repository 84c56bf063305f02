// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log setup: human-readable stderr plus an optional daily file.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "gitops-run.log";

pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` when set and valid, otherwise the verbosity default.
pub fn filter(rust_log: Option<&str>, verbose: u8) -> EnvFilter {
    rust_log
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbose)))
}

fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber. The returned guard must live until exit.
pub fn init(verbose: u8) -> Option<WorkerGuard> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file, guard) = match gr_core::env::log_dir().map(|dir| file_writer(&dir)) {
        Some(Ok((writer, guard))) => (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard)),
        Some(Err(e)) => {
            eprintln!("warning: file logging disabled: {e}");
            (None, None)
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter(rust_log.as_deref(), verbose))
        .with(stderr)
        .with(file)
        .try_init();
    if let Err(e) = installed {
        eprintln!("warning: logging already initialised: {e}");
    }
    guard
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
