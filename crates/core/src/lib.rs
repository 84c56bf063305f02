// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gr-core: cluster-independent building blocks for GitOps Run

pub mod macros;

pub mod config;
pub mod credentials;
pub mod decryption;
pub mod duration;
pub mod env;
pub mod forward_spec;
pub mod id;
pub mod ignore;
pub mod names;
pub mod paths;
pub mod stamp;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{CliConfig, ConfigError};
pub use credentials::BucketCredentials;
pub use decryption::{DecryptionError, DecryptionMaterial};
pub use duration::{format_duration, parse_duration, DurationError};
pub use forward_spec::{ForwardSpecError, PortForwardSpec, ResourceKind};
pub use id::{generate_session_name, RunId};
pub use ignore::{IgnoreError, Ignorer, PatternList};
pub use paths::{PathError, RunPaths};
pub use stamp::ReconcileStamper;
