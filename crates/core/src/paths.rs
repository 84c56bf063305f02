// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of the directories a Run operates on.
//!
//! `root` is absolute; every other path in [`RunPaths`] is relative to it and
//! lexically normalized (no `.` or `..` components). The root itself is
//! represented as `"."`.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Conventional location of cluster definitions below the current dir.
pub const CLUSTER_SUBDIR: &str = "clusters/my-cluster";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("not in a git repo: no .git found above {0}")]
    NotInGitRepo(PathBuf),

    #[error("root directory {0} does not exist")]
    MissingRoot(PathBuf),

    #[error("permission denied while inspecting {0}")]
    PermissionDenied(PathBuf),

    #[error("{path} is outside the root directory {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("target {target} must not be inside the cluster directory {cluster}")]
    TargetInsideClusterDir { target: PathBuf, cluster: PathBuf },

    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Directories resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub root: PathBuf,
    pub current: PathBuf,
    pub cluster: PathBuf,
    pub target: PathBuf,
}

impl RunPaths {
    /// Resolve paths for `target` given as typed by the user relative to `cwd`.
    ///
    /// When `root_override` is set it replaces the Git root lookup; it must
    /// exist and contain `cwd`.
    pub fn resolve(
        cwd: &Path,
        target: &str,
        root_override: Option<&Path>,
    ) -> Result<Self, PathError> {
        let cwd = absolute(cwd)?;
        let root = match root_override {
            Some(dir) => {
                let dir = normalize(&cwd.join(dir));
                if !dir.is_dir() {
                    return Err(PathError::MissingRoot(dir));
                }
                dir
            }
            None => find_git_root(&cwd)?,
        };

        let current = relative_to(&root, &cwd)?;
        let abs_target = normalize(&cwd.join(target));
        let target = relative_to(&root, &abs_target)?;
        let cluster = normalize(&current.join(CLUSTER_SUBDIR));

        if target != Path::new(".") && target.starts_with(&cluster) {
            return Err(PathError::TargetInsideClusterDir { target, cluster });
        }

        Ok(Self { root, current, cluster, target })
    }

    pub fn abs_target(&self) -> PathBuf {
        join_root(&self.root, &self.target)
    }

    pub fn abs_current(&self) -> PathBuf {
        join_root(&self.root, &self.current)
    }

    pub fn abs_cluster(&self) -> PathBuf {
        join_root(&self.root, &self.cluster)
    }

    /// Target as a bucket-relative path, e.g. `./app` for a Flux `path` field.
    pub fn target_for_flux(&self) -> String {
        if self.target == Path::new(".") {
            "./".to_string()
        } else {
            format!("./{}", slash_path(&self.target))
        }
    }
}

/// Walk upward from `start` until a directory containing `.git` is found.
pub fn find_git_root(start: &Path) -> Result<PathBuf, PathError> {
    let start = absolute(start)?;
    let mut dir = start.as_path();
    loop {
        let marker = dir.join(".git");
        match std::fs::symlink_metadata(&marker) {
            Ok(_) => return Ok(dir.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(PathError::PermissionDenied(dir.to_path_buf()));
            }
            Err(source) => return Err(PathError::Io { path: marker, source }),
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Err(PathError::NotInGitRepo(start)),
        }
    }
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` relative to `root`, or [`PathError::OutsideRoot`].
pub fn relative_to(root: &Path, path: &Path) -> Result<PathBuf, PathError> {
    let rel = path.strip_prefix(root).map_err(|_| PathError::OutsideRoot {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    })?;
    if rel.as_os_str().is_empty() {
        Ok(PathBuf::from("."))
    } else {
        Ok(rel.to_path_buf())
    }
}

/// Render a relative path with `/` separators, as used for bucket keys.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join_root(root: &Path, rel: &Path) -> PathBuf {
    if rel == Path::new(".") {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, PathError> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir()
        .map_err(|source| PathError::Io { path: path.to_path_buf(), source })?;
    Ok(normalize(&cwd.join(path)))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
