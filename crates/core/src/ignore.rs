// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gitignore-style path classification.
//!
//! Three layers are evaluated for every path:
//!
//! 1. built-in VCS patterns, which always win;
//! 2. built-in extras (CI directories, release and SOPS configs);
//! 3. user patterns from `.gitignore` then `.sourceignore`.
//!
//! Layers 2 and 3 form one ordered list where the last matching pattern
//! decides, so a user `!pattern` can re-include an extra. A path is ignored
//! when it, or any of its parent directories, is ignored.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

use crate::paths::slash_path;

pub const SOURCEIGNORE_FILE: &str = ".sourceignore";
pub const GITIGNORE_FILE: &str = ".gitignore";

/// Header written into a freshly created `.sourceignore`.
pub const SOURCEIGNORE_HEADER: &str = "# Created by GitOps Run.\n\
# Please add ignore patterns to ignore specific YAML files or directories during validation below\n";

pub const EXCLUDE_VCS: &[&str] = &[".git/", ".gitignore", ".gitmodules", ".gitattributes"];

pub const EXCLUDE_CI: &[&str] = &[
    ".github/",
    ".circleci/",
    ".travis.yml",
    ".gitlab-ci.yml",
    "appveyor.yml",
    ".drone.yml",
    "cloudbuild.yaml",
    "codeship-services.yml",
    "codeship-steps.yml",
];

pub const EXCLUDE_EXTRA: &[&str] = &[
    "**/.goreleaser.yml",
    "**/.goreleaser.brew.yml",
    "**/.sops.yaml",
    "**/.flux.yaml",
    "**/.golangci.yaml",
];

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Pattern { pattern: String, source: globset::Error },

    #[error("failed to read {path}: {source}")]
    Read { path: String, source: std::io::Error },
}

/// One parsed gitignore line.
#[derive(Debug, Clone)]
pub struct Pattern {
    matcher: GlobMatcher,
    negated: bool,
    dir_only: bool,
}

impl Pattern {
    /// Parse a single line. Blank lines and comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, IgnoreError> {
        let trimmed = line.trim_end();
        if trimmed.trim_start().is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let (negated, rest) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rest = rest
            .strip_prefix("\\!")
            .map(|r| format!("!{r}"))
            .or_else(|| rest.strip_prefix("\\#").map(|r| format!("#{r}")))
            .unwrap_or_else(|| rest.to_string());

        let (dir_only, body) = match rest.strip_suffix('/') {
            Some(body) => (true, body.to_string()),
            None => (false, rest),
        };
        if body.is_empty() {
            return Ok(None);
        }

        let anchored = body.contains('/');
        let body = body.trim_start_matches('/');
        let glob = if anchored || body.starts_with("**/") {
            body.to_string()
        } else {
            format!("**/{body}")
        };

        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .build()
            .map_err(|source| IgnoreError::Pattern { pattern: line.to_string(), source })?
            .compile_matcher();

        Ok(Some(Self { matcher, negated, dir_only }))
    }

    /// `Some(ignored)` when this pattern applies to `rel`, `None` otherwise.
    fn decide(&self, rel: &str, is_dir: bool) -> Option<bool> {
        if self.dir_only && !is_dir {
            return None;
        }
        self.matcher.is_match(rel).then_some(!self.negated)
    }
}

/// An ordered list of patterns where the last match decides.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Pattern>,
}

impl PatternList {
    /// Parse lines, skipping comments and blanks.
    pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Self, IgnoreError> {
        let mut patterns = Vec::new();
        for line in lines {
            if let Some(p) = Pattern::parse(line)? {
                patterns.push(p);
            }
        }
        Ok(Self { patterns })
    }

    /// Like [`PatternList::parse`] but drops invalid lines with a warning.
    pub fn parse_lenient<'a>(source: &str, lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut patterns = Vec::new();
        for line in lines {
            match Pattern::parse(line) {
                Ok(Some(p)) => patterns.push(p),
                Ok(None) => {}
                Err(e) => tracing::warn!(%source, error = %e, "skipping ignore pattern"),
            }
        }
        Self { patterns }
    }

    pub fn extend(&mut self, other: PatternList) {
        self.patterns.extend(other.patterns);
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn decide(&self, rel: &str, is_dir: bool) -> Option<bool> {
        self.patterns.iter().rev().find_map(|p| p.decide(rel, is_dir))
    }
}

/// Path classifier shared by the uploader, the watcher, and the validator.
#[derive(Debug, Clone)]
pub struct Ignorer {
    vcs: PatternList,
    rules: PatternList,
}

impl Ignorer {
    /// Built-in layers only.
    pub fn builtin() -> Self {
        let vcs = PatternList::parse_lenient("builtin", EXCLUDE_VCS.iter().copied());
        let rules =
            PatternList::parse_lenient("builtin", EXCLUDE_CI.iter().chain(EXCLUDE_EXTRA).copied());
        Self { vcs, rules }
    }

    /// Built-in layers followed by `user` patterns.
    pub fn with_user_patterns(user: PatternList) -> Self {
        let mut ignorer = Self::builtin();
        ignorer.rules.extend(user);
        ignorer
    }

    /// Load `.gitignore` and `.sourceignore` from `root` if present.
    ///
    /// Unparseable lines are skipped so a broken ignore file never blocks a run.
    pub fn for_root(root: &Path) -> Result<Self, IgnoreError> {
        let mut user = PatternList::default();
        for name in [GITIGNORE_FILE, SOURCEIGNORE_FILE] {
            let path = root.join(name);
            match std::fs::read_to_string(&path) {
                Ok(content) => user.extend(PatternList::parse_lenient(name, content.lines())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(IgnoreError::Read { path: path.display().to_string(), source })
                }
            }
        }
        tracing::debug!(root = %root.display(), patterns = user.len(), "loaded ignore patterns");
        Ok(Self::with_user_patterns(user))
    }

    /// True when `rel` (relative to the watched root) must be skipped.
    pub fn matches(&self, rel: &Path, is_dir: bool) -> bool {
        let rel = slash_path(rel);
        if rel.is_empty() {
            return false;
        }
        let parts: Vec<&str> = rel.split('/').collect();
        let mut prefix = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                prefix.push('/');
            }
            prefix.push_str(part);
            let last = i + 1 == parts.len();
            if self.ignored_here(&prefix, if last { is_dir } else { true }) {
                return true;
            }
        }
        false
    }

    fn ignored_here(&self, rel: &str, is_dir: bool) -> bool {
        if self.vcs.decide(rel, is_dir) == Some(true) {
            return true;
        }
        self.rules.decide(rel, is_dir) == Some(true)
    }
}

impl Default for Ignorer {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
#[path = "ignore_tests.rs"]
mod tests;
