// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural checks of the YAML under the sync root.

use std::fmt;
use std::path::{Path, PathBuf};

use gr_core::{env, Ignorer};
use serde::Deserialize;
use serde_yaml::Value;

use crate::sync::walk;
use crate::EngineError;

/// One problem found in a manifest file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Path relative to the validated root.
    pub path: PathBuf,
    /// Zero-based document index within the stream.
    pub document: usize,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (document {}): {}", self.path.display(), self.document, self.message)
    }
}

fn is_manifest(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"))
}

fn is_kustomization(doc: &Value) -> bool {
    doc.get("kind").and_then(Value::as_str) == Some("Kustomization")
        && doc
            .get("apiVersion")
            .and_then(Value::as_str)
            .is_some_and(|v| v.starts_with("kustomize.config.k8s.io/"))
}

fn missing_fields(doc: &Value) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let present = |v: Option<&Value>| v.and_then(Value::as_str).is_some_and(|s| !s.is_empty());
    if !present(doc.get("apiVersion")) {
        missing.push("apiVersion");
    }
    if !present(doc.get("kind")) {
        missing.push("kind");
    }
    if !is_kustomization(doc) && !present(doc.get("metadata").and_then(|m| m.get("name"))) {
        missing.push("metadata.name");
    }
    missing
}

/// Check one multi-document YAML stream.
pub fn validate_stream(path: &Path, content: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (document, de) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let finding = |message: String| Finding { path: path.to_path_buf(), document, message };
        let doc = match Value::deserialize(de) {
            Ok(Value::Null) => continue,
            Ok(doc) => doc,
            Err(e) => {
                findings.push(finding(format!("invalid YAML: {e}")));
                // The stream can't be resumed after a syntax error.
                break;
            }
        };
        if !doc.is_mapping() {
            findings.push(finding("document is not a mapping".to_string()));
            continue;
        }
        let missing = missing_fields(&doc);
        if !missing.is_empty() {
            findings.push(finding(format!("missing {}", missing.join(", "))));
        }
    }
    findings
}

/// Check every `*.yaml`/`*.yml` file the ignorer lets through.
pub fn validate(root: &Path, ignorer: &Ignorer) -> Result<Vec<Finding>, EngineError> {
    let tree = walk(root, ignorer)?;
    let mut findings = Vec::new();
    for rel in tree.files.iter().filter(|p| is_manifest(p)) {
        let abs = root.join(rel);
        let content = std::fs::read_to_string(&abs).map_err(|e| EngineError::io(&abs, e))?;
        findings.extend(validate_stream(rel, &content));
    }
    Ok(findings)
}

/// Create the schema cache directories if they are missing.
pub fn ensure_schema_dirs() -> Result<Vec<PathBuf>, EngineError> {
    let dirs: Vec<PathBuf> = [env::flux_schema_dir(), env::kube_schema_cache_dir()].into_iter().flatten().collect();
    for dir in &dirs {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
    }
    Ok(dirs)
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
