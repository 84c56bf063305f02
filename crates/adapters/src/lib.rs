// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gr-adapters: Kubernetes, object store and port-forward seams

pub mod cluster;
pub mod flux;
pub mod forward;
pub mod store;

pub use cluster::{Cluster, ClusterError, ClusterExt, KubeCluster};
pub use forward::{ForwardError, ForwardHandle, KubeForwarder, PortForwarder};
pub use store::{ObjectStore, S3Store, StoreError};

#[cfg(any(test, feature = "test-support"))]
pub use cluster::{ClusterCall, FakeCluster, Verb};
#[cfg(any(test, feature = "test-support"))]
pub use forward::FakeForwarder;
#[cfg(any(test, feature = "test-support"))]
pub use store::{FakeStore, StoreCall};
