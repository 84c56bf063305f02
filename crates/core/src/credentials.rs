// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session credentials for the dev bucket server.

use std::fmt;

const ALPHABET: [char; 62] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L',
    'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4',
    '5', '6', '7', '8', '9',
];

/// Length used when the caller has no preference. S3-compatible servers
/// require at least 8 characters for the secret.
pub const DEFAULT_KEY_LENGTH: usize = 20;

#[derive(Clone, PartialEq, Eq)]
pub struct BucketCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl BucketCredentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self { access_key: access_key.into(), secret_key: secret_key.into() }
    }

    /// Random printable credentials of `len` characters each (minimum 8).
    pub fn generate(len: usize) -> Self {
        let len = len.max(8);
        Self {
            access_key: nanoid::nanoid!(len, &ALPHABET),
            secret_key: nanoid::nanoid!(len, &ALPHABET),
        }
    }
}

impl Default for BucketCredentials {
    fn default() -> Self {
        Self::generate(DEFAULT_KEY_LENGTH)
    }
}

impl fmt::Debug for BucketCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
