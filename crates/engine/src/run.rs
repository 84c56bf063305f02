// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Run orchestrator.
//!
//! [`Run::start`] checks the local tree and the target namespace, brings up
//! the dev bucket and its binding, syncs the tree once, then resyncs and
//! reconciles on every batch of file changes until cancelled.
//! [`Run::teardown`] removes what start created and nothing else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gr_adapters::{Cluster, ForwardHandle, ObjectStore, PortForwarder};
use gr_core::{names, BucketCredentials, DecryptionMaterial, Ignorer, PortForwardSpec, ResourceKind, RunId, RunPaths};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::binding::{self, AutomationKind, BindingParams, Owner};
use crate::bucket_server::BucketServer;
use crate::dashboard::{create_objects, Dashboard, DashboardSpec};
use crate::flux_version::{self, FluxVersion};
use crate::sync::{init_root_dir, init_target_dir, sync_dir};
use crate::validate::{ensure_schema_dirs, validate};
use crate::watch::{watch_loop, TreeWatcher, DEBOUNCE};
use crate::{EngineError, Reconciler};

/// Port the dashboard Service listens on.
pub const DASHBOARD_SERVICE_PORT: u16 = 9001;

/// Knobs of one Run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub cwd: PathBuf,
    /// Directory to sync, as typed by the user.
    pub target: String,
    pub root_dir: Option<PathBuf>,
    /// Namespace of the Bucket and its binding.
    pub namespace: String,
    pub timeout: Duration,
    /// Raw `--port-forward` value.
    pub port_forward: Option<String>,
    /// `None` disables the dashboard.
    pub dashboard: Option<DashboardSpec>,
    pub dashboard_port: u16,
    /// Install the dashboard when none is found.
    pub install_dashboard: bool,
    pub decryption_key_file: Option<PathBuf>,
    pub automation_kind: AutomationKind,
    pub skip_resource_cleanup: bool,
    /// Flux version the user expects; a mismatch is only reported.
    pub flux_version: Option<String>,
    pub debounce: Duration,
}

impl RunOptions {
    pub fn new(cwd: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            target: target.into(),
            root_dir: None,
            namespace: gr_core::env::flux_system_namespace(),
            timeout: Duration::from_secs(5 * 60),
            port_forward: None,
            dashboard: None,
            dashboard_port: DASHBOARD_SERVICE_PORT,
            install_dashboard: true,
            decryption_key_file: None,
            automation_kind: AutomationKind::default(),
            skip_resource_cleanup: false,
            flux_version: None,
            debounce: DEBOUNCE,
        }
    }

    gr_core::setters! {
        into { namespace: String }
        set {
            timeout: Duration,
            dashboard_port: u16,
            install_dashboard: bool,
            automation_kind: AutomationKind,
            skip_resource_cleanup: bool,
            debounce: Duration,
        }
        option {
            root_dir: PathBuf,
            port_forward: String,
            dashboard: DashboardSpec,
            decryption_key_file: PathBuf,
            flux_version: String,
        }
    }
}

/// What teardown could not remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub errors: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn absorb(&mut self, result: Result<(), EngineError>) {
        match result {
            Ok(()) => {}
            Err(EngineError::Teardown(errors)) => self.errors.extend(errors),
            Err(e) => self.errors.push(e.to_string()),
        }
    }

    pub fn into_result(self) -> Result<(), EngineError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(EngineError::Teardown(self.errors))
        }
    }

    fn logged(self) -> Self {
        for error in &self.errors {
            tracing::error!("{error}");
        }
        self
    }
}

/// Cluster state a run has started to create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Provisioned {
    bucket_server: bool,
    binding: bool,
}

#[derive(Default)]
struct Forwards {
    bucket: Option<ForwardHandle>,
    dashboard: Option<ForwardHandle>,
    app: Option<ForwardHandle>,
}

impl Forwards {
    fn take_all(&mut self) -> Vec<ForwardHandle> {
        [self.bucket.take(), self.dashboard.take(), self.app.take()].into_iter().flatten().collect()
    }
}

/// Resolved at the start of a run.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub paths: RunPaths,
    pub flux: FluxVersion,
    pub ignorer: Ignorer,
}

pub struct Run<C, F, S> {
    cluster: C,
    forwarder: F,
    store: S,
    credentials: BucketCredentials,
    run_id: RunId,
    options: RunOptions,
    reconciler: Reconciler<C>,
    app_forward: Option<PortForwardSpec>,
    forwards: Mutex<Forwards>,
    provisioned: Mutex<Provisioned>,
}

impl<C, F, S> Run<C, F, S>
where
    C: Cluster,
    F: PortForwarder,
    S: ObjectStore,
{
    /// `store` must talk to the bucket server through the local forward
    /// authenticated with `credentials`.
    pub fn new(
        cluster: C,
        forwarder: F,
        store: S,
        credentials: BucketCredentials,
        options: RunOptions,
    ) -> Result<Self, EngineError> {
        let app_forward = options
            .port_forward
            .as_deref()
            .map(|spec| PortForwardSpec::parse(spec, &options.namespace))
            .transpose()?;
        Ok(Self {
            reconciler: Reconciler::new(cluster.clone()),
            cluster,
            forwarder,
            store,
            credentials,
            run_id: RunId::new(),
            options,
            app_forward,
            forwards: Mutex::new(Forwards::default()),
            provisioned: Mutex::new(Provisioned::default()),
        })
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler<C>) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Prepare, then resync on file changes until `cancel` fires.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), EngineError> {
        let prepared = self.prepare(cancel).await?;
        self.watch(&prepared, cancel).await
    }

    /// Everything up to and including the first sync and reconcile.
    ///
    /// Local checks and the name collision check run before the first
    /// cluster write.
    pub async fn prepare(&self, cancel: &CancellationToken) -> Result<Prepared, EngineError> {
        let options = &self.options;
        let paths = RunPaths::resolve(&options.cwd, &options.target, options.root_dir.as_deref())?;
        tracing::info!(
            root = %paths.root.display(),
            target = %paths.target.display(),
            "Resolved directories"
        );

        if let Some(file) = &options.decryption_key_file {
            DecryptionMaterial::load(file)?;
        }
        if init_target_dir(&paths.abs_target())? {
            tracing::info!("Created {} in {}", crate::sync::KUSTOMIZATION_FILE, paths.abs_target().display());
        }
        if init_root_dir(&paths.root)? {
            tracing::info!("Created .sourceignore in {}", paths.root.display());
        }
        let ignorer = Ignorer::for_root(&paths.root)?;
        self.report_validation(&paths.root, &ignorer);

        binding::check_collisions(&self.cluster, &options.namespace, options.automation_kind).await?;

        let flux = flux_version::discover(&self.cluster).await?;
        if flux.guessed {
            tracing::warn!(
                "Flux version {} was guessed from source-controller {}",
                flux.version,
                flux.source_version.as_deref().unwrap_or("unknown")
            );
        } else {
            tracing::info!("Flux version {} is found in namespace {}", flux.version, flux.namespace);
        }
        if let Some(expected) = options.flux_version.as_deref().filter(|v| *v != flux.version) {
            tracing::warn!("Flux {} is installed, not the requested {expected}", flux.version);
        }

        if let Some(spec) = &options.dashboard {
            self.ensure_dashboard(spec, cancel).await?;
        }

        self.provisioned.lock().bucket_server = true;
        let bucket = BucketServer::new(self.cluster.clone(), self.forwarder.clone()).cancel(cancel.clone());
        let handle = bucket.install(&self.credentials).await?;
        self.forwards.lock().bucket = Some(handle);

        self.provisioned.lock().binding = true;
        binding::setup(&self.cluster, &self.binding_params(&paths)).await?;

        let prepared = Prepared { paths, flux, ignorer };
        self.sync(&prepared, cancel).await?;
        match self.reconcile_and_forward(cancel).await {
            Ok(()) => {}
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => tracing::error!(error = %e, "Initial reconciliation failed; waiting for changes"),
        }
        Ok(prepared)
    }

    fn binding_params(&self, paths: &RunPaths) -> BindingParams {
        let options = &self.options;
        let params = BindingParams::new(&options.namespace, paths.target_for_flux(), self.credentials.clone())
            .timeout(options.timeout)
            .run_id(self.run_id.clone())
            .kind(options.automation_kind);
        match &options.decryption_key_file {
            Some(file) => params.decryption_key_file(file.clone()),
            None => params,
        }
    }

    fn report_validation(&self, root: &Path, ignorer: &Ignorer) {
        if let Err(e) = ensure_schema_dirs() {
            tracing::warn!(error = %e, "could not create schema cache directories");
        }
        match validate(root, ignorer) {
            Ok(findings) => {
                for finding in findings {
                    tracing::warn!("{finding}");
                }
            }
            Err(e) => tracing::warn!(error = %e, "validation skipped"),
        }
    }

    async fn ensure_dashboard(&self, spec: &DashboardSpec, cancel: &CancellationToken) -> Result<(), EngineError> {
        let dashboard = Dashboard::new(self.reconciler.clone().with_cancel(cancel.clone()));
        let installed = dashboard.installed(&spec.namespace).await?;
        let name = match (&installed.oss, &installed.enterprise) {
            (Some(name), _) => name.clone(),
            (None, Some(name)) => {
                tracing::info!("Enterprise dashboard {name} found; skipping the dashboard");
                return Ok(());
            }
            (None, None) if self.options.install_dashboard && !spec.password_hash.is_empty() => {
                tracing::info!("Installing the GitOps Dashboard ...");
                dashboard.install(&create_objects(spec)?).await?;
                dashboard.reconcile(&spec.name, &spec.namespace, self.options.timeout).await?;
                spec.name.clone()
            }
            (None, None) => {
                tracing::info!("No dashboard installed");
                return Ok(());
            }
        };

        let forward = PortForwardSpec {
            namespace: spec.namespace.clone(),
            name,
            kind: ResourceKind::Service,
            host_port: self.options.dashboard_port,
            container_port: DASHBOARD_SERVICE_PORT,
        };
        let handle = self.forwarder.forward(&forward).await?;
        tracing::info!("Dashboard is available at http://localhost:{}", handle.local_port());
        self.forwards.lock().dashboard = Some(handle);
        Ok(())
    }

    async fn sync(&self, prepared: &Prepared, cancel: &CancellationToken) -> Result<(), EngineError> {
        let report =
            sync_dir(cancel, &prepared.paths.root, names::DEV_BUCKET_NAME, &self.store, &prepared.ignorer).await?;
        if !report.failed.is_empty() {
            tracing::warn!(failed = report.failed.len(), "Some files were not uploaded");
        }
        Ok(())
    }

    /// Reconcile the binding, then replace the user's port forward.
    async fn reconcile_and_forward(&self, cancel: &CancellationToken) -> Result<(), EngineError> {
        let options = &self.options;
        let reconciler = self.reconciler.clone().with_cancel(cancel.clone());
        match options.automation_kind {
            AutomationKind::Kustomize => {
                reconciler.reconcile_dev_kustomization(&options.namespace, options.timeout).await?
            }
            AutomationKind::Helm => reconciler.reconcile_dev_helm_release(&options.namespace, options.timeout).await?,
        }

        let Some(spec) = &self.app_forward else {
            return Ok(());
        };
        let previous = self.forwards.lock().app.take();
        if let Some(handle) = previous {
            handle.shutdown().await;
        }
        match self.forwarder.forward(spec).await {
            Ok(handle) => {
                tracing::info!(
                    "Port forwarding {}/{} to http://localhost:{}",
                    spec.kind,
                    spec.name,
                    handle.local_port()
                );
                self.forwards.lock().app = Some(handle);
            }
            Err(e) => tracing::error!(error = %e, "Error forwarding {}/{}", spec.kind, spec.name),
        }
        Ok(())
    }

    /// One resync cycle.
    pub async fn cycle(&self, prepared: &Prepared, cancel: &CancellationToken) -> Result<(), EngineError> {
        self.sync(prepared, cancel).await?;
        self.reconcile_and_forward(cancel).await
    }

    /// Watch the root and run a cycle per batch of changes.
    pub async fn watch(&self, prepared: &Prepared, cancel: &CancellationToken) -> Result<(), EngineError> {
        let (watcher, mut rx) = TreeWatcher::new(&prepared.paths.root, prepared.ignorer.clone())?;
        let watcher = Mutex::new(watcher);
        watcher.lock().refresh()?;
        tracing::info!("Watching {} for changes", prepared.paths.root.display());

        let watcher = &watcher;
        watch_loop(cancel, &mut rx, self.options.debounce, move |_| async move {
            // New directories need their own watch.
            watcher.lock().refresh()?;
            self.cycle(prepared, cancel).await
        })
        .await;
        Ok(())
    }

    /// Stop the forwards, then delete what this run provisioned within a
    /// fresh deadline. Objects in the target namespace are only deleted when
    /// they carry this run's id.
    pub async fn teardown(&self) -> TeardownReport {
        let handles = self.forwards.lock().take_all();
        for handle in handles {
            handle.shutdown().await;
        }

        if self.options.skip_resource_cleanup {
            tracing::info!("Skipping resource cleanup");
            return TeardownReport::default();
        }
        let provisioned = *self.provisioned.lock();
        if provisioned == Provisioned::default() {
            tracing::debug!("nothing was provisioned; skipping cleanup");
            return TeardownReport::default();
        }
        tracing::info!("Cleaning up ...");
        let deadline = self.options.timeout;
        match tokio::time::timeout(deadline, self.remove_provisioned(provisioned)).await {
            Ok(report) => report.logged(),
            Err(_) => TeardownReport { errors: vec![format!("cleanup did not finish within {deadline:?}")] }.logged(),
        }
    }

    async fn remove_provisioned(&self, provisioned: Provisioned) -> TeardownReport {
        let mut report = TeardownReport::default();
        if provisioned.binding {
            let owner = Owner::Run(&self.run_id);
            report.absorb(
                binding::teardown(&self.cluster, &self.options.namespace, self.options.automation_kind, owner).await,
            );
        }
        if provisioned.bucket_server {
            report.absorb(BucketServer::new(self.cluster.clone(), self.forwarder.clone()).uninstall().await);
        }
        report
    }
}

/// Delete the run-stamped bindings of `kinds`, then the bucket server.
/// Every step runs; failures are collected.
pub async fn remove_resources<C: Cluster, F: PortForwarder>(
    cluster: &C,
    forwarder: &F,
    namespace: &str,
    kinds: &[AutomationKind],
) -> TeardownReport {
    let mut report = TeardownReport::default();
    for kind in kinds {
        report.absorb(binding::teardown(cluster, namespace, *kind, Owner::AnyRun).await);
    }
    report.absorb(BucketServer::new(cluster.clone(), forwarder.clone()).uninstall().await);
    report.logged()
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
