// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gr-engine: the GitOps Run engine
//!
//! Everything here is generic over the `gr-adapters` seams, so the same code
//! drives a live cluster and the in-memory fakes.

mod error;
pub mod poll;

pub mod apply;
pub mod binding;
pub mod bucket_server;
pub mod dashboard;
pub mod flux_version;
pub mod reconcile;
pub mod run;
pub mod session;
pub mod sync;
pub mod validate;
pub mod watch;

pub use error::EngineError;
pub use poll::{Backoff, Poll};
pub use reconcile::Reconciler;
pub use run::{Run, RunOptions, TeardownReport};
