// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral sessions (C7).
//!
//! A session is a virtual cluster installed by a HelmRelease. The tool
//! connects to it, re-invokes itself against the session's kube context,
//! and removes the session once the child exits.

mod child;
mod kubeconfig;

pub use child::{child_args, command_annotation, forward_to_children, parse_ppid, run_child};
pub use kubeconfig::{rewrite_kubeconfig, SessionKubeconfig};

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use gr_adapters::flux::{
    CrdPolicy, CrossNamespaceSourceReference, HelmChartTemplate, HelmChartTemplateSpec,
    HelmRelease, HelmReleaseSpec, HelmRepository, HelmRepositorySpec,
};
use gr_adapters::forward::running_pod_by_labels;
use gr_adapters::{Cluster, ClusterError, ClusterExt, PortForwarder};
use gr_core::names::{annotations, labels};
use gr_core::{format_duration, PortForwardSpec, ResourceKind};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, ServiceAccount};
use kube::ResourceExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::binding::AutomationKind;
use crate::poll::{poll_until, Poll};
use crate::EngineError;

pub const CHART_REPOSITORY: &str = "loft-sh";
pub const CHART_REPOSITORY_URL: &str = "https://charts.loft.sh";
pub const CHART: &str = "vcluster";
/// Local port the session API server is forwarded to.
pub const DEFAULT_LOCAL_PORT: u16 = 8443;

/// A session to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub namespace: String,
    /// Namespace of Flux inside the session.
    pub flux_namespace: String,
    pub port_forwards: Vec<String>,
    pub dashboard_hashed_password: String,
    pub automation_kind: AutomationKind,
}

impl Session {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            flux_namespace: gr_core::env::flux_system_namespace(),
            port_forwards: Vec::new(),
            dashboard_hashed_password: String::new(),
            automation_kind: AutomationKind::default(),
        }
    }

    gr_core::setters! {
        into { flux_namespace: String, dashboard_hashed_password: String }
        set { port_forwards: Vec<String>, automation_kind: AutomationKind }
    }

    fn annotations(&self, command: &str, cli_version: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (annotations::CLI_VERSION.to_string(), cli_version.to_string()),
            (annotations::PORT_FORWARD.to_string(), self.port_forwards.join(",")),
            (annotations::COMMAND.to_string(), command.to_string()),
            (annotations::NAMESPACE.to_string(), self.flux_namespace.clone()),
            (annotations::AUTOMATION_KIND.to_string(), self.automation_kind.to_string()),
        ])
    }
}

pub fn helm_repository(namespace: &str) -> HelmRepository {
    let mut repo = HelmRepository::new(
        CHART_REPOSITORY,
        HelmRepositorySpec { url: CHART_REPOSITORY_URL.to_string(), ..Default::default() },
    );
    repo.metadata.namespace = Some(namespace.to_string());
    repo
}

/// The release that installs the session's virtual cluster. Its values
/// carry the labels and annotations the chart copies onto the StatefulSet.
pub fn helm_release(session: &Session, command: &str, cli_version: &str) -> HelmRelease {
    let meta = session.annotations(command, cli_version);
    let mut release = HelmRelease::new(
        &session.name,
        HelmReleaseSpec {
            interval: format_duration(Duration::from_secs(60 * 60)),
            chart: HelmChartTemplate {
                spec: HelmChartTemplateSpec {
                    chart: CHART.to_string(),
                    source_ref: CrossNamespaceSourceReference::new("HelmRepository", CHART_REPOSITORY),
                    ..Default::default()
                },
            },
            release_name: Some(session.name.clone()),
            target_namespace: Some(session.namespace.clone()),
            install: Some(CrdPolicy { crds: Some("Create".to_string()) }),
            upgrade: Some(CrdPolicy { crds: Some("CreateReplace".to_string()) }),
            values: Some(json!({
                "labels": { (labels::PART_OF): labels::PART_OF_GITOPS_RUN },
                "annotations": meta,
            })),
            ..Default::default()
        },
    );
    release.metadata.namespace = Some(session.namespace.clone());
    release.metadata.labels = Some(BTreeMap::from([
        (labels::APP.to_string(), labels::APP_VCLUSTER.to_string()),
        (labels::PART_OF.to_string(), labels::PART_OF_GITOPS_RUN.to_string()),
    ]));
    release.metadata.annotations = Some(meta);
    release
}

/// A session found in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub namespace: String,
    pub command: String,
    pub cli_version: String,
    pub port_forwards: String,
    pub flux_namespace: String,
    pub automation_kind: String,
    pub ready: bool,
}

impl SessionInfo {
    fn from_statefulset(sts: &StatefulSet) -> Self {
        let meta = sts.annotations();
        let get = |key: &str| meta.get(key).cloned().unwrap_or_default();
        Self {
            name: sts.name_any(),
            namespace: sts.namespace().unwrap_or_default(),
            command: get(annotations::COMMAND),
            cli_version: get(annotations::CLI_VERSION),
            port_forwards: get(annotations::PORT_FORWARD),
            flux_namespace: get(annotations::NAMESPACE),
            automation_kind: get(annotations::AUTOMATION_KIND),
            ready: ready_replicas(sts) >= 1,
        }
    }
}

fn ready_replicas(sts: &StatefulSet) -> i32 {
    sts.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or_default()
}

fn is_session(sts: &StatefulSet) -> bool {
    let found = sts.labels();
    found.get(labels::APP).map(String::as_str) == Some(labels::APP_VCLUSTER)
        && found.get(labels::PART_OF).map(String::as_str) == Some(labels::PART_OF_GITOPS_RUN)
}

fn data_claim(name: &str) -> String {
    format!("data-{name}-0")
}

/// Creates, finds and removes sessions.
#[derive(Clone)]
pub struct SessionManager<C> {
    cluster: C,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<C: Cluster> SessionManager<C> {
    pub fn new(cluster: C) -> Self {
        Self {
            cluster,
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(5 * 60),
            cancel: CancellationToken::new(),
        }
    }

    gr_core::setters! {
        set { interval: Duration, timeout: Duration, cancel: CancellationToken }
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Install the session and wait for its StatefulSet to have a ready
    /// replica.
    pub async fn install(&self, session: &Session, command: &str, cli_version: &str) -> Result<(), EngineError> {
        let ns = Some(session.namespace.as_str());
        tracing::info!("Creating session {}/{} ...", session.namespace, session.name);
        self.cluster.create_if_absent(ns, &helm_repository(&session.namespace)).await?;
        self.cluster.create_if_absent(ns, &helm_release(session, command, cli_version)).await?;

        tracing::info!("Waiting for session {} to become ready ...", session.name);
        let cluster = &self.cluster;
        let name = session.name.as_str();
        poll_until(&self.cancel, &format!("session {}/{name}", session.namespace), self.interval, self.timeout, move || async move {
            match cluster.get_opt::<StatefulSet>(ns, name).await? {
                None => Ok(Poll::pending_with("statefulset not created yet")),
                Some(sts) if ready_replicas(&sts) >= 1 => Ok(Poll::Ready(())),
                Some(_) => Ok(Poll::pending_with("no ready replica yet")),
            }
        })
        .await?;
        tracing::info!("Session {} is ready", session.name);
        Ok(())
    }

    /// Sessions in `namespace`, or across all namespaces.
    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<SessionInfo>, EngineError> {
        let selector = labels::session_selector();
        let sets: Vec<StatefulSet> = self.cluster.list_typed(namespace, Some(&selector)).await?;
        Ok(sets.iter().map(SessionInfo::from_statefulset).collect())
    }

    pub async fn get(&self, name: &str, namespace: &str) -> Result<SessionInfo, EngineError> {
        match self.cluster.get_opt::<StatefulSet>(Some(namespace), name).await? {
            Some(sts) if is_session(&sts) => Ok(SessionInfo::from_statefulset(&sts)),
            _ => Err(EngineError::Session(format!("session {namespace}/{name} not found"))),
        }
    }

    /// Delete the release, wait for the StatefulSet and its data claim to
    /// go, then delete the shared chart repository.
    pub async fn remove(&self, name: &str, namespace: &str) -> Result<(), EngineError> {
        let ns = Some(namespace);
        tracing::info!("Removing session {namespace}/{name} ...");
        self.cluster.delete_if_present::<HelmRelease>(ns, name).await?;

        let cluster = &self.cluster;
        poll_until(&self.cancel, &format!("statefulset {namespace}/{name} to terminate"), self.interval, self.timeout, move || async move {
            match cluster.get_opt::<StatefulSet>(ns, name).await? {
                None => Ok(Poll::Ready(())),
                Some(_) => Ok(Poll::pending_with("statefulset still present")),
            }
        })
        .await?;

        let claim = data_claim(name);
        let claim_name = claim.as_str();
        self.cluster.delete_if_present::<PersistentVolumeClaim>(ns, claim_name).await?;
        poll_until(&self.cancel, &format!("claim {namespace}/{claim}"), self.interval, self.timeout, move || async move {
            match cluster.get_opt::<PersistentVolumeClaim>(ns, claim_name).await? {
                None => Ok(Poll::Ready(())),
                Some(_) => Ok(Poll::pending_with("claim still present")),
            }
        })
        .await?;

        // Other sessions may share the repository.
        if !self.cluster.delete_if_present::<HelmRepository>(ns, CHART_REPOSITORY).await? {
            tracing::debug!("chart repository {CHART_REPOSITORY} already removed");
        }
        tracing::info!("Session {namespace}/{name} was successfully removed.");
        Ok(())
    }

    /// The kubeconfig the virtual cluster publishes in Secret `vc-<name>`.
    pub async fn kubeconfig(&self, name: &str, namespace: &str) -> Result<String, EngineError> {
        let secret_name = format!("vc-{name}");
        let secret: Secret = self.cluster.get_typed(Some(namespace), &secret_name).await?;
        let bytes = secret
            .data
            .and_then(|mut d| d.remove("config"))
            .ok_or_else(|| EngineError::Session(format!("secret {secret_name} has no config key")))?;
        String::from_utf8(bytes.0)
            .map_err(|e| EngineError::Session(format!("secret {secret_name} is not valid UTF-8: {e}")))
    }

    /// Name of the running virtual cluster pod.
    pub async fn pod(&self, name: &str, namespace: &str) -> Result<String, EngineError> {
        let selector = format!("{}={},release={name}", labels::APP, labels::APP_VCLUSTER);
        let cluster = &self.cluster;
        let selector = selector.as_str();
        poll_until(&self.cancel, &format!("a running vcluster pod in {namespace}"), Duration::from_secs(1), Duration::from_secs(6), move || async move {
            Ok(match running_pod_by_labels(cluster, namespace, selector).await? {
                Some(pod) if pod.metadata.deletion_timestamp.is_none() => Poll::Ready(pod.name_any()),
                _ => Poll::pending_with(format!("can't find a running vcluster pod in namespace {namespace}")),
            })
        })
        .await
    }
}

/// Poll until `default/default` ServiceAccount is readable through the
/// session's own API.
pub async fn wait_reachable<S: Cluster>(
    cancel: &CancellationToken,
    session_cluster: &S,
    interval: Duration,
    timeout: Duration,
) -> Result<(), EngineError> {
    poll_until(cancel, "session API server", interval, timeout, move || async move {
        match session_cluster.get_typed::<ServiceAccount>(Some("default"), "default").await {
            Ok(_) => Ok(Poll::Ready(())),
            Err(e @ (ClusterError::NotFound(_) | ClusterError::Transport(_) | ClusterError::Api(_))) => {
                Ok(Poll::pending_with(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
}

/// Everything needed to run the tool again inside a session.
#[derive(Debug, Clone)]
pub struct SessionRun {
    pub session: Session,
    /// Full argv of the current invocation, program first.
    pub argv: Vec<String>,
    pub program: PathBuf,
    pub cli_version: String,
    pub local_port: u16,
    pub skip_cleanup: bool,
}

/// Install the session, connect to it, run the child and remove the
/// session. Returns the child's exit code.
///
/// `connect` turns the rewritten kubeconfig into a client for the session.
/// `cancel` stops the waits and the child; removal runs on `manager`'s own
/// token so it still happens after a signal.
pub async fn run_in_session<C, F, S, Connect, Fut>(
    manager: &SessionManager<C>,
    forwarder: &F,
    run: &SessionRun,
    cancel: &CancellationToken,
    connect: Connect,
) -> Result<i32, EngineError>
where
    C: Cluster,
    F: PortForwarder,
    S: Cluster,
    Connect: FnOnce(String, String) -> Fut,
    Fut: Future<Output = Result<S, ClusterError>>,
{
    let session = &run.session;
    let command = command_annotation(&run.argv);
    let waiting = manager.clone().cancel(cancel.clone());
    waiting.install(session, &command, &run.cli_version).await?;

    let result = connect_and_run(&waiting, forwarder, run, cancel, connect).await;

    if run.skip_cleanup {
        tracing::info!("Leaving session {} in place", session.name);
    } else if let Err(e) = manager.remove(&session.name, &session.namespace).await {
        tracing::error!(error = %e, "Error removing session {}", session.name);
        return match result {
            Ok(_) => Err(EngineError::Teardown(vec![format!("session {}: {e}", session.name)])),
            Err(first) => Err(first),
        };
    }
    result
}

async fn connect_and_run<C, F, S, Connect, Fut>(
    manager: &SessionManager<C>,
    forwarder: &F,
    run: &SessionRun,
    cancel: &CancellationToken,
    connect: Connect,
) -> Result<i32, EngineError>
where
    C: Cluster,
    F: PortForwarder,
    S: Cluster,
    Connect: FnOnce(String, String) -> Fut,
    Fut: Future<Output = Result<S, ClusterError>>,
{
    let session = &run.session;
    let pod = manager.pod(&session.name, &session.namespace).await?;
    let raw = manager.kubeconfig(&session.name, &session.namespace).await?;
    let config = rewrite_kubeconfig(&raw, &session.name, run.local_port)?;

    let spec = PortForwardSpec {
        namespace: session.namespace.clone(),
        name: pod,
        kind: ResourceKind::Pod,
        host_port: run.local_port,
        container_port: config.remote_port,
    };
    let tunnel = forwarder.forward(&spec).await?;

    let session_cluster = connect(config.yaml.clone(), session.name.clone()).await?;
    wait_reachable(cancel, &session_cluster, Duration::from_millis(200), Duration::from_secs(3 * 60)).await?;

    let mut file = tempfile::NamedTempFile::new().map_err(|e| EngineError::io(std::env::temp_dir(), e))?;
    std::io::Write::write_all(&mut file, config.yaml.as_bytes())
        .map_err(|e| EngineError::io(file.path(), e))?;

    let args = child_args(&run.argv, &session.name, &session.dashboard_hashed_password);
    tracing::info!("Connected to session {}, starting GitOps Run inside it ...", session.name);
    let code = run_child(&run.program, &args, file.path(), cancel).await?;
    tunnel.shutdown().await;
    Ok(code)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
