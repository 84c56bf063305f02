// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Help and version output.

use crate::prelude::*;

#[test]
fn help_lists_commands() {
    cli()
        .args(&["--help"])
        .passes()
        .stdout_has("Usage:")
        .stdout_has("run")
        .stdout_has("remove")
        .stdout_has("get")
        .stdout_has("set")
        .stdout_has("create");
}

#[test]
fn no_args_is_a_usage_error() {
    cli().fails_with(2).stderr_has("Usage:");
}

#[test]
fn run_help_shows_flags() {
    cli()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--port-forward")
        .stdout_has("--allow-k8s-context")
        .stdout_has("--automation-kind")
        .stdout_lacks("--x-session-name");
}

#[test]
fn version_flag() {
    cli().args(&["--version"]).passes().stdout_has("0.2");
}

#[test]
fn version_command_prints_build_info() {
    cli()
        .args(&["version"])
        .passes()
        .stdout_has("Current Version: 0.2.0")
        .stdout_has("GitCommit:")
        .stdout_has("BuildTime:");
}

#[test]
fn unknown_flag_is_a_usage_error() {
    cli().args(&["run", "--no-such-flag"]).fails_with(2);
}
