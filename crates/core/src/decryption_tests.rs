// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    age = { "/tmp/key.agekey", Some(AGE_KEY) },
    pgp = { "keys/identity.asc", Some(PGP_KEY) },
    pem = { "/tmp/key.pem", None },
    bare = { "key", None },
)]
fn extension_maps_to_secret_key(path: &str, expected: Option<&str>) {
    assert_eq!(secret_key_for(Path::new(path)).ok(), expected);
}

#[test]
fn loads_age_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("key.agekey");
    std::fs::write(&path, "AGE-SECRET-KEY-1ABC").unwrap();

    let material = DecryptionMaterial::load(&path).unwrap();
    assert_eq!(material.filename, "key.agekey");
    assert_eq!(material.secret_key, "age.agekey");
    assert_eq!(material.bytes, b"AGE-SECRET-KEY-1ABC");
}

#[test]
fn unknown_extension_fails_before_reading() {
    // File does not exist: the extension check must fire first.
    let err = DecryptionMaterial::load(Path::new("/nonexistent/key.pem")).unwrap_err();
    assert!(err.to_string().contains("failed determining decryption key type"));
}

#[test]
fn unreadable_file_reports_path() {
    let err = DecryptionMaterial::load(Path::new("/nonexistent/key.asc")).unwrap_err();
    assert!(matches!(err, DecryptionError::Read { .. }));
    assert!(err.to_string().contains("/nonexistent/key.asc"));
}
