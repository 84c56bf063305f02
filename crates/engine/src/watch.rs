// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File watcher loop (C6).
//!
//! A notify watcher feeds relative paths into a channel; the loop coalesces
//! bursts into batches and hands each batch to a resync callback.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use gr_core::Ignorer;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sync::{walk, Tree};
use crate::EngineError;

/// Bursts closer together than this are folded into one resync.
pub const DEBOUNCE: Duration = Duration::from_millis(680);

/// Map an event path to its path relative to `root`, or `None` when the
/// path sits in a hidden directory or is ignored.
pub fn relevant(root: &Path, ignorer: &Ignorer, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    let mut parents = rel.components().collect::<Vec<_>>();
    parents.pop();
    let hidden_parent = parents
        .iter()
        .any(|c| matches!(c, Component::Normal(s) if s.to_string_lossy().starts_with('.')));
    if hidden_parent {
        return None;
    }
    if ignorer.matches(rel, path.is_dir()) {
        return None;
    }
    Some(rel.to_path_buf())
}

/// Subscribes to every eligible directory under a root, one
/// non-recursive watch each, so ignored subtrees never produce events.
pub struct TreeWatcher {
    root: PathBuf,
    ignorer: Ignorer,
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl TreeWatcher {
    /// Start watching `root`. Relevant changes arrive on the returned
    /// receiver as paths relative to `root`.
    pub fn new(
        root: &Path,
        ignorer: Ignorer,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PathBuf>), EngineError> {
        let root = std::fs::canonicalize(root).map_err(|e| EngineError::io(root, e))?;
        let (tx, rx) = mpsc::unbounded_channel();

        let cb_root = root.clone();
        let cb_ignorer = ignorer.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                for path in &event.paths {
                    if let Some(rel) = relevant(&cb_root, &cb_ignorer, path) {
                        let _ = tx.send(rel);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "file watcher error"),
        })?;

        let mut this = Self { root, ignorer, watcher, watched: HashSet::new() };
        this.refresh()?;
        Ok((this, rx))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-walk the tree, subscribing new directories and dropping vanished
    /// ones.
    pub fn refresh(&mut self) -> Result<Tree, EngineError> {
        let tree = walk(&self.root, &self.ignorer)?;
        let current: HashSet<PathBuf> = tree.dirs.iter().cloned().collect();

        for gone in self.watched.difference(&current).cloned().collect::<Vec<_>>() {
            if let Err(e) = self.watcher.unwatch(&self.root.join(&gone)) {
                tracing::debug!(dir = %gone.display(), error = %e, "unwatch failed");
            }
            self.watched.remove(&gone);
        }
        for dir in &tree.dirs {
            if self.watched.contains(dir) {
                continue;
            }
            self.watcher.watch(&self.root.join(dir), RecursiveMode::NonRecursive)?;
            self.watched.insert(dir.clone());
        }
        tracing::debug!(dirs = self.watched.len(), "watching directories");
        Ok(tree)
    }

    pub fn watched_dirs(&self) -> usize {
        self.watched.len()
    }
}

/// What the loop received.
#[derive(Debug, PartialEq, Eq)]
pub enum Batch {
    /// Distinct relative paths, sorted.
    Changes(Vec<PathBuf>),
    /// The sender went away.
    Closed,
    /// Cancelled; carries the number of pending events discarded.
    Cancelled { drained: usize },
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PathBuf>) -> usize {
    let mut drained = 0;
    while rx.try_recv().is_ok() {
        drained += 1;
    }
    drained
}

/// Wait for the first event, then collect everything that arrives within
/// `window` of it.
pub async fn next_batch(
    rx: &mut mpsc::UnboundedReceiver<PathBuf>,
    cancel: &CancellationToken,
    window: Duration,
) -> Batch {
    let first = tokio::select! {
        _ = cancel.cancelled() => return Batch::Cancelled { drained: drain(rx) },
        path = rx.recv() => match path {
            Some(path) => path,
            None => return Batch::Closed,
        },
    };

    let mut paths = BTreeSet::from([first]);
    let deadline = tokio::time::Instant::now() + window;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Batch::Cancelled { drained: paths.len() + drain(rx) },
            next = tokio::time::timeout_at(deadline, rx.recv()) => match next {
                Ok(Some(path)) => {
                    paths.insert(path);
                }
                Ok(None) | Err(_) => break,
            },
        }
    }
    Batch::Changes(paths.into_iter().collect())
}

/// Run `on_change` once per batch until cancelled or the channel closes.
/// Callback errors are logged and the loop keeps going.
pub async fn watch_loop<F, Fut>(
    cancel: &CancellationToken,
    rx: &mut mpsc::UnboundedReceiver<PathBuf>,
    window: Duration,
    mut on_change: F,
) where
    F: FnMut(Vec<PathBuf>) -> Fut,
    Fut: Future<Output = Result<(), EngineError>>,
{
    loop {
        match next_batch(rx, cancel, window).await {
            Batch::Changes(paths) => {
                tracing::info!(changes = paths.len(), "Files changed, resyncing ...");
                for path in &paths {
                    tracing::debug!(path = %path.display(), "changed");
                }
                match on_change(paths).await {
                    Ok(()) => {}
                    Err(EngineError::Cancelled) => {
                        tracing::debug!("resync cancelled");
                    }
                    Err(e) => tracing::error!(error = %e, "Error during resync"),
                }
            }
            Batch::Closed => {
                tracing::warn!("file watcher channel closed");
                return;
            }
            Batch::Cancelled { drained } => {
                tracing::debug!(drained, "watcher stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
