// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guards that stop `run` and `remove run` before touching a cluster.

use crate::prelude::*;

#[test]
fn remote_context_is_refused() {
    let home = Home::new("prod-eu");
    cli()
        .isolated(&home)
        .args(&["run", "./app"])
        .fails_with(2)
        .stderr_has("--allow-k8s-context=prod-eu");
}

#[test]
fn allowing_another_context_does_not_help() {
    let home = Home::new("prod-eu");
    cli()
        .isolated(&home)
        .args(&["run", "./app", "--allow-k8s-context=staging"])
        .fails_with(2)
        .stderr_has("does not look like a local cluster");
}

#[test]
fn explicit_context_flag_is_checked() {
    let home = Home::new("kind-dev");
    cli()
        .isolated(&home)
        .args(&["run", "./app", "--context=prod-us"])
        .fails_with(2)
        .stderr_has("prod-us");
}

#[test]
fn session_flags_conflict() {
    cli().args(&["run", "--session", "--no-session"]).fails_with(2);
}

#[test]
fn remove_run_needs_a_target() {
    let home = Home::new("kind-dev");
    cli()
        .isolated(&home)
        .args(&["remove", "run"])
        .fails_with(2)
        .stderr_has("--all-sessions");
}

#[test]
fn remove_run_refuses_remote_context() {
    let home = Home::new("prod-eu");
    cli().isolated(&home).args(&["remove", "run", "--no-session"]).fails_with(2);
}
