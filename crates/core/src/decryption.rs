// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SOPS decryption material read from a local key file.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub const AGE_KEY: &str = "age.agekey";
pub const PGP_KEY: &str = "identity.asc";

#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("failed determining decryption key type from filename {0}")]
    UnknownKeyType(String),

    #[error("failed reading decryption key file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
}

/// Key file contents plus the Secret data key they are stored under.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionMaterial {
    pub filename: String,
    pub secret_key: &'static str,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for DecryptionMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionMaterial")
            .field("filename", &self.filename)
            .field("secret_key", &self.secret_key)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Map a key file name to its well-known Secret data key.
pub fn secret_key_for(path: &Path) -> Result<&'static str, DecryptionError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("agekey") => Ok(AGE_KEY),
        Some("asc") => Ok(PGP_KEY),
        _ => Err(DecryptionError::UnknownKeyType(path.display().to_string())),
    }
}

impl DecryptionMaterial {
    /// Validate the extension, then read the file.
    pub fn load(path: &Path) -> Result<Self, DecryptionError> {
        let secret_key = secret_key_for(path)?;
        let bytes = std::fs::read(path)
            .map_err(|source| DecryptionError::Read { path: path.to_path_buf(), source })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, secret_key, bytes })
    }
}

#[cfg(test)]
#[path = "decryption_tests.rs"]
mod tests;
