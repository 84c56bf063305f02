// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fluent wrapper over `assert_cmd` for the CLI specs.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub use similar_asserts::assert_eq;

pub fn cli() -> Cli {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin("gitops-run"));
    cmd.env_remove("RUST_LOG").env_remove("GITOPS_RUN_LOG_DIR").env("NO_COLOR", "1");
    Cli { cmd }
}

pub struct Cli {
    cmd: assert_cmd::Command,
}

impl Cli {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        self.cmd.env(key, value);
        self
    }

    /// Point config, cache and kubeconfig at a scratch directory.
    pub fn isolated(self, home: &Home) -> Self {
        self.env("GITOPS_CONFIG_DIR", home.config_dir())
            .env("GITOPS_CACHE_DIR", home.path().join("cache"))
            .env("KUBECONFIG", home.kubeconfig())
    }

    fn output(mut self) -> Output {
        let out = self.cmd.output().unwrap();
        Output {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        }
    }

    pub fn passes(self) -> Output {
        let out = self.output();
        assert_eq!(out.code, Some(0), "expected success\nstdout: {}\nstderr: {}", out.stdout, out.stderr);
        out
    }

    pub fn fails(self) -> Output {
        let out = self.output();
        assert!(out.code != Some(0), "expected failure\nstdout: {}", out.stdout);
        out
    }

    pub fn fails_with(self, code: i32) -> Output {
        let out = self.output();
        assert_eq!(out.code, Some(code), "stdout: {}\nstderr: {}", out.stdout, out.stderr);
        out
    }
}

pub struct Output {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(self.stdout.contains(needle), "stdout lacks {needle:?}:\n{}", self.stdout);
        self
    }

    pub fn stdout_lacks(self, needle: &str) -> Self {
        assert!(!self.stdout.contains(needle), "stdout has {needle:?}:\n{}", self.stdout);
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(self.stderr.contains(needle), "stderr lacks {needle:?}:\n{}", self.stderr);
        self
    }

    pub fn stdout_eq(self, expected: &str) -> Self {
        assert_eq!(self.stdout, expected);
        self
    }
}

/// Scratch home directory with a kubeconfig whose current context is
/// `context`.
pub struct Home {
    dir: TempDir,
}

impl Home {
    pub fn new(context: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let kubeconfig = format!(
            "apiVersion: v1
kind: Config
clusters:
- name: {context}
  cluster: {{server: 'https://127.0.0.1:1'}}
users:
- name: {context}
  user: {{token: none}}
contexts:
- name: {context}
  context: {{cluster: {context}, user: {context}}}
current-context: {context}
"
        );
        std::fs::write(dir.path().join("kubeconfig"), kubeconfig).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.path().join("config")
    }

    pub fn kubeconfig(&self) -> PathBuf {
        self.path().join("kubeconfig")
    }
}
