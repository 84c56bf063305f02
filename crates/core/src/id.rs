// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run identifiers

crate::define_id! {
    /// Identifies one Run; stamped into the `run-id` annotation.
    pub struct RunId("run-");
}

const SESSION_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Default session name: `run-` and eight lowercase alphanumerics, valid as
/// a Kubernetes object name and a kube context name.
pub fn generate_session_name() -> String {
    format!("run-{}", nanoid::nanoid!(8, &SESSION_ALPHABET))
}
