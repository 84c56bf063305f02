// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Re-invoking the tool inside a session.

use std::path::{Path, PathBuf};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::EngineError;

/// Flags the child must not inherit, and whether each takes a value.
const OVERRIDDEN: &[(&str, bool)] = &[
    ("--session", false),
    ("--no-session", false),
    ("--no-bootstrap", false),
    ("--skip-resource-cleanup", false),
    ("--session-name", true),
    ("--session-namespace", true),
    ("--x-session-name", true),
    ("--allow-k8s-context", true),
    ("--context", true),
    ("--dashboard-hashed-password", true),
];

/// Arguments for the child: the original arguments (program excluded) with
/// session flags stripped, then the flags that pin it to the session.
pub fn child_args(argv: &[String], session: &str, hashed_password: &str) -> Vec<String> {
    let mut args = Vec::with_capacity(argv.len() + 6);
    let mut rest = argv.iter().skip(1);
    while let Some(arg) = rest.next() {
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (arg.as_str(), false),
        };
        match OVERRIDDEN.iter().find(|(name, _)| *name == flag) {
            Some((_, takes_value)) => {
                if *takes_value && !inline_value {
                    rest.next();
                }
            }
            None => args.push(arg.clone()),
        }
    }
    args.extend([
        "--no-session".to_string(),
        format!("--x-session-name={session}"),
        "--no-bootstrap".to_string(),
        format!("--allow-k8s-context={session}"),
        "--skip-resource-cleanup".to_string(),
        format!("--dashboard-hashed-password={hashed_password}"),
    ]);
    args
}

/// `run.weave.works/command` value: program base name and arguments.
pub fn command_annotation(argv: &[String]) -> String {
    let mut parts = Vec::with_capacity(argv.len());
    if let Some(program) = argv.first() {
        let base = Path::new(program).file_name().map(|n| n.to_string_lossy().into_owned());
        parts.push(base.unwrap_or_else(|| program.clone()));
    }
    parts.extend(argv.iter().skip(1).cloned());
    parts.join(" ")
}

/// Parent pid from the contents of `/proc/<pid>/stat`. The command name
/// may contain spaces and parentheses, so fields are read after the last `)`.
pub fn parse_ppid(stat: &str) -> Option<i32> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

#[cfg(target_os = "linux")]
fn children_of(parent: i32) -> Vec<i32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse::<i32>().ok()))
        .filter(|pid| {
            std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .ok()
                .and_then(|s| parse_ppid(&s))
                == Some(parent)
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn children_of(_parent: i32) -> Vec<i32> {
    Vec::new()
}

/// Send SIGUSR1 to every direct child of this process so each can tear
/// down its own resources. Returns the pids signalled.
pub fn forward_to_children() -> Vec<i32> {
    let me = std::process::id() as i32;
    let mut signalled = Vec::new();
    for pid in children_of(me) {
        match kill(Pid::from_raw(pid), Signal::SIGUSR1) {
            Ok(()) => signalled.push(pid),
            Err(e) => tracing::debug!(pid, error = %e, "failed to signal child"),
        }
    }
    signalled
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| 128 + s)).unwrap_or(1)
}

/// Run `program args` with `KUBECONFIG` set and stdio inherited. When
/// `cancel` fires the children are asked to clean up and the child is
/// awaited. Returns the child's exit code.
pub async fn run_child(
    program: &Path,
    args: &[String],
    kubeconfig: &Path,
    cancel: &CancellationToken,
) -> Result<i32, EngineError> {
    tracing::debug!(program = %program.display(), ?args, "starting session child");
    let mut child = Command::new(program)
        .args(args)
        .env("KUBECONFIG", kubeconfig)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| EngineError::io(PathBuf::from(program), e))?;

    let status = tokio::select! {
        status = child.wait() => status,
        () = cancel.cancelled() => {
            let signalled = forward_to_children();
            tracing::info!("Asked {} child process(es) to clean up", signalled.len());
            child.wait().await
        }
    }
    .map_err(|e| EngineError::io(PathBuf::from(program), e))?;
    Ok(exit_code(status))
}

#[cfg(test)]
#[path = "child_tests.rs"]
mod tests;
