// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory sync into the dev bucket (C5).
//!
//! Every sync purges and recreates the bucket, then uploads the eligible
//! files of the tree keyed by their slash-separated path below the root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use gr_adapters::{ObjectStore, StoreError};
use gr_core::ignore::{SOURCEIGNORE_FILE, SOURCEIGNORE_HEADER};
use gr_core::paths::slash_path;
use gr_core::Ignorer;
use tokio_util::sync::CancellationToken;

use crate::EngineError;

pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// Entry point written into an empty target directory.
pub const KUSTOMIZATION_STUB: &str = "---
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
resources: [] # Start adding the resources you want to sync here
";

/// Eligible directories and files of a tree, relative to its root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tree {
    /// Directories to watch, root (`""`) included.
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Walk `root`, skipping hidden directories and anything `ignorer` matches.
/// Results are sorted.
pub fn walk(root: &Path, ignorer: &Ignorer) -> Result<Tree, EngineError> {
    let mut tree = Tree { dirs: vec![PathBuf::new()], files: Vec::new() };
    let mut pending = vec![PathBuf::new()];
    while let Some(rel_dir) = pending.pop() {
        let abs_dir = root.join(&rel_dir);
        let entries = std::fs::read_dir(&abs_dir).map_err(|e| EngineError::io(&abs_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::io(&abs_dir, e))?;
            let rel = rel_dir.join(entry.file_name());
            let file_type = entry.file_type().map_err(|e| EngineError::io(entry.path(), e))?;
            let is_dir = file_type.is_dir();
            if is_dir && is_hidden(&entry.file_name()) {
                continue;
            }
            if ignorer.matches(&rel, is_dir) {
                continue;
            }
            if is_dir {
                tree.dirs.push(rel.clone());
                pending.push(rel);
            } else if file_type.is_file() || entry.path().is_file() {
                tree.files.push(rel);
            }
        }
    }
    tree.dirs.sort();
    tree.files.sort();
    Ok(tree)
}

/// Outcome of one sync.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    /// Empty files the server refused.
    pub skipped: usize,
    pub failed: Vec<String>,
}

/// Purge the bucket, recreate it, and upload the tree below `root`.
///
/// Per-file failures are logged and collected; only bucket errors, walk
/// errors and cancellation abort the sync.
pub async fn sync_dir<S: ObjectStore>(
    cancel: &CancellationToken,
    root: &Path,
    bucket: &str,
    store: &S,
    ignorer: &Ignorer,
) -> Result<SyncReport, EngineError> {
    tracing::info!("Refreshing bucket {bucket} ...");
    match store.remove_bucket(bucket, true).await {
        Ok(()) | Err(StoreError::NoSuchBucket(_)) => {}
        Err(e) => return Err(e.into()),
    }
    store.make_bucket(bucket).await?;

    let tree = walk(root, ignorer)?;
    let mut report = SyncReport::default();
    for rel in &tree.files {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let key = slash_path(rel);
        let path = root.join(rel);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(%key, "file vanished before upload");
                continue;
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to read file");
                report.failed.push(key);
                continue;
            }
        };
        match store.put_object(bucket, &key, body).await {
            Ok(()) => report.uploaded += 1,
            Err(StoreError::MissingContentLength(_)) => {
                tracing::debug!(%key, "skipping empty file");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to upload file");
                report.failed.push(key);
            }
        }
    }
    tracing::info!("Uploaded {} files", report.uploaded);
    Ok(report)
}

/// Create the target directory with a stub `kustomization.yaml` when it is
/// missing or empty. Returns `true` when the stub was written.
pub fn init_target_dir(target: &Path) -> Result<bool, EngineError> {
    let empty = match std::fs::metadata(target) {
        Ok(meta) if !meta.is_dir() => {
            return Err(EngineError::Precondition(format!(
                "target must be a directory: {}",
                target.display()
            )))
        }
        Ok(_) => std::fs::read_dir(target)
            .map_err(|e| EngineError::io(target, e))?
            .next()
            .is_none(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            std::fs::create_dir_all(target).map_err(|e| EngineError::io(target, e))?;
            true
        }
        Err(e) => return Err(EngineError::io(target, e)),
    };
    if !empty {
        return Ok(false);
    }
    let stub = target.join(KUSTOMIZATION_FILE);
    std::fs::write(&stub, KUSTOMIZATION_STUB).map_err(|e| EngineError::io(&stub, e))?;
    tracing::info!(path = %stub.display(), "created entrypoint {KUSTOMIZATION_FILE}");
    Ok(true)
}

/// Create `<root>/.sourceignore` with a comment header unless it exists.
/// Returns `true` when the file was written.
pub fn init_root_dir(root: &Path) -> Result<bool, EngineError> {
    let meta = std::fs::metadata(root).map_err(|e| EngineError::io(root, e))?;
    if !meta.is_dir() {
        return Err(EngineError::Precondition(format!(
            "root must be a directory: {}",
            root.display()
        )));
    }
    let path = root.join(SOURCEIGNORE_FILE);
    match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            use std::io::Write;
            file.write_all(SOURCEIGNORE_HEADER.as_bytes()).map_err(|e| EngineError::io(&path, e))?;
            tracing::info!(
                "{SOURCEIGNORE_FILE} file created. Please add ignore patterns to ignore specific \
                 YAML files or directories during validation to it"
            );
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(EngineError::io(&path, e)),
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
