// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `get config` / `set config`

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn missing_config_reads_as_defaults() {
    let home = Home::new("kind-dev");
    cli().isolated(&home).args(&["get", "config"]).passes().stdout_has("analytics: false");
}

#[test]
fn set_then_get() {
    let home = Home::new("kind-dev");
    cli().isolated(&home).args(&["set", "config", "analytics=true"]).passes();

    let out = cli().isolated(&home).args(&["get", "config", "-o", "json"]).passes();
    let json: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert_eq!(json["analytics"], true);
    assert_eq!(json["userId"].as_str().map(str::len), Some(10));

    let file = std::fs::read_to_string(home.config_dir().join("weave-gitops-config.json")).unwrap();
    assert!(file.contains("\"userId\""), "{file}");
}

#[test]
fn unknown_key_is_refused() {
    let home = Home::new("kind-dev");
    cli()
        .isolated(&home)
        .args(&["set", "config", "colour=blue"])
        .fails_with(2)
        .stderr_has("unknown config key");
}

#[test]
fn malformed_setting_is_a_usage_error() {
    let home = Home::new("kind-dev");
    cli().isolated(&home).args(&["set", "config", "analytics"]).fails_with(2).stderr_has("KEY=VALUE");
}

#[test]
fn malformed_config_file_fails() {
    let home = Home::new("kind-dev");
    std::fs::create_dir_all(home.config_dir()).unwrap();
    std::fs::write(home.config_dir().join("weave-gitops-config.json"), "{not json").unwrap();
    cli().isolated(&home).args(&["get", "config"]).fails_with(1);
}
