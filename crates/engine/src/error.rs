// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use gr_adapters::{ClusterError, ForwardError, StoreError};
use gr_core::{ConfigError, DecryptionError, ForwardSpecError, IgnoreError, PathError};
use thiserror::Error;

/// Errors surfaced by the Run engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("bucket error: {0}")]
    Store(#[from] StoreError),

    #[error("port forward error: {0}")]
    Forward(#[from] ForwardError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Ignore(#[from] IgnoreError),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ForwardSpec(#[from] ForwardSpecError),

    /// Missing Flux, missing CRDs, bad flag combinations.
    #[error("{0}")]
    Precondition(String),

    /// An object reported a terminal not-ready condition.
    #[error("{0}")]
    NotReady(String),

    #[error("timed out waiting for {what}{}", suffix(.last_message))]
    Timeout { what: String, last_message: Option<String> },

    #[error(
        "{kind} {namespace}/{name} already exists and was not created by GitOps Run; \
         remove it or pick another namespace"
    )]
    NameCollision { kind: String, namespace: String, name: String },

    #[error("no objects found in manifest stream")]
    EmptyManifest,

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("cancelled")]
    Cancelled,

    #[error("teardown left state behind: {}", .0.join("; "))]
    Teardown(Vec<String>),
}

fn suffix(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(": {m}"),
        _ => String::new(),
    }
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn timeout(what: impl Into<String>, last_message: Option<String>) -> Self {
        Self::Timeout { what: what.into(), last_message }
    }
}
