// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object names, labels, and annotation keys shared by every Run component.
//!
//! These are cluster-visible conventions; changing one orphans objects
//! created by older releases.

/// Namespace hosting the dev bucket server.
pub const RUN_NAMESPACE: &str = "gitops-run";

/// Name of the bucket server Deployment, its Service, and the Flux `Bucket`.
pub const DEV_BUCKET: &str = "run-dev-bucket";

/// Credentials Secret referenced by the `Bucket` source.
pub const DEV_BUCKET_CREDENTIALS: &str = "run-dev-bucket-credentials";

/// Name of the bucket inside the S3-compatible server.
pub const DEV_BUCKET_NAME: &str = "run-dev-bucket";

/// Kustomization binding.
pub const DEV_KUSTOMIZATION: &str = "run-dev-ks";

/// HelmRelease binding.
pub const DEV_HELM_RELEASE: &str = "run-dev-helm";

/// SOPS decryption Secret attached to the binding.
pub const DEV_DECRYPTION_SECRET: &str = "run-dev-ks-decryption";

/// Keys inside the credentials Secret.
pub const ACCESS_KEY: &str = "accesskey";
pub const SECRET_KEY: &str = "secretkey";

/// Default S3-compatible server image; see [`crate::env::bucket_server_image`].
pub const BUCKET_SERVER_IMAGE: &str = "ghcr.io/weaveworks/gitops-bucket-server:latest";

/// Default port of the bucket server inside the cluster and on localhost.
pub const DEV_BUCKET_PORT: u16 = 9000;
pub const DEV_BUCKET_HTTPS_PORT: u16 = 9443;

pub const FLUX_SYSTEM_NAMESPACE: &str = "flux-system";

/// Field manager used for server-side apply.
pub const FIELD_OWNER: &str = "flux";
pub const FIELD_GROUP: &str = "fluxcd.io";

pub mod annotations {
    pub const RECONCILE_REQUESTED_AT: &str = "reconcile.fluxcd.io/requestedAt";

    pub const COMMAND: &str = "run.weave.works/command";
    pub const CLI_VERSION: &str = "run.weave.works/cli-version";
    pub const PORT_FORWARD: &str = "run.weave.works/port-forward";
    pub const NAMESPACE: &str = "run.weave.works/namespace";
    pub const AUTOMATION_KIND: &str = "run.weave.works/automation-kind";

    pub const DESCRIPTION: &str = "metadata.weave.works/description";
    pub const RUN_ID: &str = "metadata.weave.works/run-id";
    pub const USERNAME: &str = "metadata.weave.works/username";

    /// Text stored under [`DESCRIPTION`] for the Bucket and its binding.
    pub const TEMPORARY_DESCRIPTION: &str = "This is a temporary object created by GitOps Run. \
         This will be cleaned up when this instance of GitOps Run is ended.";
}

pub mod labels {
    pub const APP: &str = "app";
    pub const NAME: &str = "app.kubernetes.io/name";
    pub const COMPONENT: &str = "app.kubernetes.io/component";
    pub const PART_OF: &str = "app.kubernetes.io/part-of";
    pub const CREATED_BY: &str = "app.kubernetes.io/created-by";
    pub const VERSION: &str = "app.kubernetes.io/version";
    pub const INSTANCE: &str = "app.kubernetes.io/instance";

    /// `app.kubernetes.io/part-of` value for session objects.
    pub const PART_OF_GITOPS_RUN: &str = "gitops-run";
    /// `app` value for virtual cluster objects.
    pub const APP_VCLUSTER: &str = "vcluster";

    /// Labels Flux stamps on objects managed by a Kustomization.
    pub const KUSTOMIZE_NAME: &str = "kustomize.toolkit.fluxcd.io/name";
    pub const KUSTOMIZE_NAMESPACE: &str = "kustomize.toolkit.fluxcd.io/namespace";

    /// Selector enumerating session StatefulSets.
    pub fn session_selector() -> String {
        format!("{APP}={APP_VCLUSTER},{PART_OF}={PART_OF_GITOPS_RUN}")
    }
}

/// Kube context names that point at a workstation-local cluster.
pub fn is_local_context(context: &str) -> bool {
    context.starts_with("kind-")
        || context.starts_with("k3d-")
        || matches!(context, "minikube" | "docker-for-desktop" | "docker-desktop")
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;
