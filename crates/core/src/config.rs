// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local CLI configuration stored as JSON in the user config dir.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE: &str = "weave-gitops-config.json";

/// Length of a generated `userId`.
pub const USER_ID_LENGTH: usize = 10;

const USER_ID_ALPHABET: [char; 64] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L',
    'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4',
    '5', '6', '7', '8', '9', '+', '/',
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("user config directory could not be determined")]
    NoConfigDir,

    #[error("error reading config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("error writing config file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error(
        "your CLI configuration at {path} should be a JSON object like \
         {{\"analytics\": true, \"userId\": \"\"}}: {source}"
    )]
    Format { path: PathBuf, source: serde_json::Error },

    #[error("unknown config key {0:?}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub analytics: bool,
    #[serde(default, rename = "userId")]
    pub user_id: String,
}

impl CliConfig {
    /// Default location, honouring `GITOPS_CONFIG_DIR`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        crate::env::config_dir().map(|d| d.join(CONFIG_FILE)).ok_or(ConfigError::NoConfigDir)
    }

    /// Load from `path`. A missing or empty file yields the default config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(&data)
            .map_err(|source| ConfigError::Format { path: path.to_path_buf(), source })
    }

    /// Write pretty JSON, generating a `userId` first if none is set.
    pub fn save(&mut self, path: &Path) -> Result<(), ConfigError> {
        if self.user_id.is_empty() {
            self.user_id = generate_user_id();
        }
        let write_err = |source| ConfigError::Write { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let data = serde_json::to_vec_pretty(self)
            .map_err(|source| ConfigError::Format { path: path.to_path_buf(), source })?;
        std::fs::write(path, data).map_err(write_err)
    }

    /// Apply `key=value` from `set config`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "analytics" => {
                self.analytics = value.parse::<bool>().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
                Ok(())
            }
            other => Err(ConfigError::UnknownKey(other.to_string())),
        }
    }
}

/// Random 10-character id from `[A-Za-z0-9+/]`.
pub fn generate_user_id() -> String {
    nanoid::nanoid!(USER_ID_LENGTH, &USER_ID_ALPHABET)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
