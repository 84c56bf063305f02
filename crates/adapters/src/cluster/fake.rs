// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`Cluster`] for tests.
//!
//! Objects are keyed by `(group, kind, namespace, name)`; the API version is
//! ignored so a `v1beta2` read sees a `v1` write. Reactors stand in for
//! controllers: they run after every write and may fill in `status`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use super::{display_ref, parse_selector, Cluster, ClusterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Replace,
    Patch,
    Apply,
    Delete,
}

gr_core::simple_display! {
    Verb {
        Get => "get",
        List => "list",
        Create => "create",
        Replace => "replace",
        Patch => "patch",
        Apply => "apply",
        Delete => "delete",
    }
}

/// Recorded API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCall {
    pub verb: Verb,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ClusterCall {
    /// `verb Kind ns/name`, handy for ordering assertions.
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.verb, self.kind, display_ref(self.namespace.as_deref(), &self.name))
    }
}

/// Controller stand-in invoked after each write to objects of one kind.
pub type Reactor = Arc<dyn Fn(Verb, &mut Value) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Key {
    group: String,
    kind: String,
    namespace: String,
    name: String,
}

impl Key {
    fn new(api: &ApiResource, namespace: Option<&str>, name: &str) -> Self {
        Self {
            group: api.group.clone(),
            kind: api.kind.clone(),
            namespace: namespace.unwrap_or_default().to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Default)]
struct FakeClusterState {
    objects: BTreeMap<Key, Value>,
    calls: Vec<ClusterCall>,
    reactors: HashMap<String, Vec<Reactor>>,
    failures: Vec<(Verb, String, ClusterError)>,
    deletion_delay: HashMap<String, u32>,
    terminating: HashMap<Key, u32>,
    unknown_kinds: HashSet<String>,
    cluster_scoped: HashSet<String>,
    resource_version: u64,
}

/// Fake Kubernetes API for testing
#[derive(Clone)]
pub struct FakeCluster {
    inner: Arc<Mutex<FakeClusterState>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        let mut state = FakeClusterState::default();
        for kind in [
            "Namespace",
            "CustomResourceDefinition",
            "ClusterRole",
            "ClusterRoleBinding",
            "PersistentVolume",
            "StorageClass",
            "Node",
        ] {
            state.cluster_scoped.insert(kind.to_string());
        }
        Self { inner: Arc::new(Mutex::new(state)) }
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.inner.lock().calls.clone()
    }

    /// Recorded calls rendered with [`ClusterCall::describe`], excluding reads.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| !matches!(c.verb, Verb::Get | Verb::List))
            .map(ClusterCall::describe)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Register a reactor for `kind`.
    pub fn on(&self, kind: &str, reactor: Reactor) -> &Self {
        self.inner.lock().reactors.entry(kind.to_string()).or_default().push(reactor);
        self
    }

    /// Fail the next `verb` on `kind` with `err`.
    pub fn fail_next(&self, verb: Verb, kind: &str, err: ClusterError) -> &Self {
        self.inner.lock().failures.push((verb, kind.to_string(), err));
        self
    }

    /// Deleted objects of `kind` linger for `gets` reads with a
    /// `deletionTimestamp`, like a terminating namespace.
    pub fn delay_deletion(&self, kind: &str, gets: u32) -> &Self {
        self.inner.lock().deletion_delay.insert(kind.to_string(), gets);
        self
    }

    /// Make [`Cluster::resolve`] report `kind` as not installed.
    pub fn unregister_kind(&self, kind: &str) -> &Self {
        self.inner.lock().unknown_kinds.insert(kind.to_string());
        self
    }

    /// Seed an object without recording a call or running reactors.
    pub fn insert<K: Serialize>(&self, obj: &K) {
        let Ok(mut value) = serde_json::to_value(obj) else {
            tracing::warn!("fake cluster cannot serialize seed object");
            return;
        };
        let api_version = value["apiVersion"].as_str().unwrap_or_default().to_string();
        let group = api_version.rsplit_once('/').map(|(g, _)| g.to_string()).unwrap_or_default();
        let key = Key {
            group,
            kind: value["kind"].as_str().unwrap_or_default().to_string(),
            namespace: value["metadata"]["namespace"].as_str().unwrap_or_default().to_string(),
            name: value["metadata"]["name"].as_str().unwrap_or_default().to_string(),
        };
        let mut state = self.inner.lock();
        state.resource_version += 1;
        value["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());
        if value["metadata"]["generation"].is_null() {
            value["metadata"]["generation"] = json!(1);
        }
        state.objects.insert(key, value);
    }

    /// Raw stored object, if any.
    pub fn object(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<Value> {
        let state = self.inner.lock();
        state
            .objects
            .iter()
            .find(|(k, _)| {
                k.kind == kind && k.namespace == namespace.unwrap_or_default() && k.name == name
            })
            .map(|(_, v)| v.clone())
    }

    pub fn exists(&self, kind: &str, namespace: Option<&str>, name: &str) -> bool {
        self.object(kind, namespace, name).is_some()
    }

    /// Names of stored objects of `kind`, sorted.
    pub fn names(&self, kind: &str) -> Vec<String> {
        self.inner.lock().objects.keys().filter(|k| k.kind == kind).map(|k| k.name.clone()).collect()
    }

    /// Mutate a stored object in place, as a controller would.
    pub fn update_object(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        f: impl FnOnce(&mut Value),
    ) {
        let mut state = self.inner.lock();
        if let Some((_, v)) = state.objects.iter_mut().find(|(k, _)| {
            k.kind == kind && k.namespace == namespace.unwrap_or_default() && k.name == name
        }) {
            f(v);
        }
    }

    /// Reactors that mark Flux objects reconciled and ready whenever a
    /// reconcile request annotation is present.
    pub fn with_flux_controllers(self) -> Self {
        let reactor: Reactor = Arc::new(|_, obj| {
            let requested = obj["metadata"]["annotations"]["reconcile.fluxcd.io/requestedAt"]
                .as_str()
                .map(str::to_string);
            let mut conditions = vec![json!({"type": "Ready", "status": "True", "reason": "Succeeded", "message": "ok"})];
            if obj["kind"] == "Kustomization" {
                conditions.push(json!({"type": "Healthy", "status": "True", "reason": "Succeeded", "message": "ok"}));
            }
            let generation = obj["metadata"]["generation"].clone();
            let status = &mut obj["status"];
            if !status.is_object() {
                *status = json!({});
            }
            if let Some(requested) = requested {
                status["lastHandledReconcileRequest"] = json!(requested);
            }
            status["conditions"] = Value::Array(conditions);
            status["observedGeneration"] = generation;
        });
        for kind in ["Bucket", "Kustomization", "HelmRelease", "HelmChart", "HelmRepository"] {
            self.on(kind, reactor.clone());
        }
        self
    }

    /// Reactors that make Deployments, StatefulSets, Namespaces and CRDs
    /// report ready immediately.
    pub fn with_workload_controllers(self) -> Self {
        self.on(
            "Deployment",
            Arc::new(|_, obj| {
                let replicas = obj["spec"]["replicas"].as_i64().unwrap_or(1);
                obj["status"] = json!({
                    "replicas": replicas,
                    "readyReplicas": replicas,
                    "observedGeneration": obj["metadata"]["generation"].clone(),
                });
            }),
        );
        self.on(
            "StatefulSet",
            Arc::new(|_, obj| {
                obj["status"] = json!({ "replicas": 1, "readyReplicas": 1 });
            }),
        );
        self.on(
            "Namespace",
            Arc::new(|_, obj| {
                obj["status"] = json!({ "phase": "Active" });
            }),
        );
        self.on(
            "CustomResourceDefinition",
            Arc::new(|_, obj| {
                obj["status"] = json!({
                    "conditions": [{"type": "Established", "status": "True"}]
                });
            }),
        );
        self
    }

    fn record(
        state: &mut FakeClusterState,
        verb: Verb,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        state.calls.push(ClusterCall {
            verb,
            kind: api.kind.clone(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        });
        if let Some(pos) = state.failures.iter().position(|(v, k, _)| *v == verb && *k == api.kind)
        {
            let (_, _, err) = state.failures.remove(pos);
            return Err(err);
        }
        Ok(())
    }

    fn react(state: &FakeClusterState, verb: Verb, kind: &str, obj: &mut Value) {
        if let Some(reactors) = state.reactors.get(kind) {
            for r in reactors {
                r(verb, obj);
            }
        }
    }

    fn store(
        state: &mut FakeClusterState,
        verb: Verb,
        api: &ApiResource,
        key: Key,
        mut value: Value,
    ) -> Result<DynamicObject, ClusterError> {
        state.resource_version += 1;
        value["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());
        if !key.namespace.is_empty() {
            value["metadata"]["namespace"] = json!(key.namespace);
        }
        if value["apiVersion"].is_null() {
            value["apiVersion"] = json!(api.api_version);
        }
        if value["kind"].is_null() {
            value["kind"] = json!(api.kind);
        }
        Self::react(state, verb, &api.kind, &mut value);
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    fn not_found(api: &ApiResource, namespace: Option<&str>, name: &str) -> ClusterError {
        ClusterError::NotFound(format!("{} {}", api.kind, display_ref(namespace, name)))
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch) => {
            if !target.is_object() {
                *target = json!({});
            }
            if let Value::Object(map) = target {
                for (k, v) in patch {
                    if v.is_null() {
                        map.remove(k);
                    } else {
                        merge_patch(map.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

fn labels_match(obj: &Value, selector: &[(String, String)]) -> bool {
    selector.iter().all(|(k, v)| obj["metadata"]["labels"][k].as_str() == Some(v.as_str()))
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        let mut state = self.inner.lock();
        Self::record(&mut state, Verb::Get, api, namespace, name)?;
        let key = Key::new(api, namespace, name);
        if let Some(remaining) = state.terminating.get_mut(&key) {
            if *remaining == 0 {
                state.terminating.remove(&key);
                state.objects.remove(&key);
            } else {
                *remaining -= 1;
            }
        }
        let value = state.objects.get(&key).cloned().ok_or_else(|| Self::not_found(api, namespace, name))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn list(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let mut state = self.inner.lock();
        Self::record(&mut state, Verb::List, api, namespace, "")?;
        let selector = selector.map(parse_selector).unwrap_or_default();
        state
            .objects
            .iter()
            .filter(|(k, _)| k.group == api.group && k.kind == api.kind)
            .filter(|(k, _)| namespace.map_or(true, |ns| k.namespace == ns))
            .filter(|(_, v)| labels_match(v, &selector))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(ClusterError::from))
            .collect()
    }

    async fn create(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let mut state = self.inner.lock();
        Self::record(&mut state, Verb::Create, api, namespace, &name)?;
        let key = Key::new(api, namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(format!(
                "{} {}",
                api.kind,
                display_ref(namespace, &name)
            )));
        }
        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["generation"] = json!(1);
        value["metadata"]["uid"] = json!(format!("uid-{}", state.resource_version + 1));
        Self::store(&mut state, Verb::Create, api, key, value)
    }

    async fn replace(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let mut state = self.inner.lock();
        Self::record(&mut state, Verb::Replace, api, namespace, &name)?;
        let key = Key::new(api, namespace, &name);
        let current =
            state.objects.get(&key).cloned().ok_or_else(|| Self::not_found(api, namespace, &name))?;
        if let Some(rv) = &obj.metadata.resource_version {
            if current["metadata"]["resourceVersion"].as_str() != Some(rv.as_str()) {
                return Err(ClusterError::Conflict(format!(
                    "{} {} has been modified",
                    api.kind,
                    display_ref(namespace, &name)
                )));
            }
        }
        let mut value = serde_json::to_value(obj)?;
        let generation = current["metadata"]["generation"].as_i64().unwrap_or(1);
        let bumped = if value["spec"] != current["spec"] { generation + 1 } else { generation };
        value["metadata"]["generation"] = json!(bumped);
        if value.get("status").is_none() {
            value["status"] = current["status"].clone();
        }
        Self::store(&mut state, Verb::Replace, api, key, value)
    }

    async fn merge_patch(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, ClusterError> {
        let mut state = self.inner.lock();
        Self::record(&mut state, Verb::Patch, api, namespace, name)?;
        let key = Key::new(api, namespace, name);
        let mut value =
            state.objects.get(&key).cloned().ok_or_else(|| Self::not_found(api, namespace, name))?;
        let before = value["spec"].clone();
        merge_patch(&mut value, patch);
        if value["spec"] != before {
            let generation = value["metadata"]["generation"].as_i64().unwrap_or(1);
            value["metadata"]["generation"] = json!(generation + 1);
        }
        Self::store(&mut state, Verb::Patch, api, key, value)
    }

    async fn apply(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
        field_manager: &str,
    ) -> Result<DynamicObject, ClusterError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let mut state = self.inner.lock();
        Self::record(&mut state, Verb::Apply, api, namespace, &name)?;
        let key = Key::new(api, namespace, &name);
        let mut value = serde_json::to_value(obj)?;
        let generation = match state.objects.get(&key) {
            Some(current) => {
                let g = current["metadata"]["generation"].as_i64().unwrap_or(1);
                if value["spec"] != current["spec"] {
                    g + 1
                } else {
                    g
                }
            }
            None => 1,
        };
        value["metadata"]["generation"] = json!(generation);
        value["metadata"]["managedFields"] = json!([{ "manager": field_manager, "operation": "Apply" }]);
        Self::store(&mut state, Verb::Apply, api, key, value)
    }

    async fn delete(
        &self,
        api: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.inner.lock();
        Self::record(&mut state, Verb::Delete, api, namespace, name)?;
        let key = Key::new(api, namespace, name);
        if !state.objects.contains_key(&key) || state.terminating.contains_key(&key) {
            return Err(Self::not_found(api, namespace, name));
        }
        if api.kind == "Namespace" {
            state.objects.retain(|k, _| k.namespace != name);
        }
        match state.deletion_delay.get(&api.kind).copied() {
            Some(gets) if gets > 0 => {
                if let Some(v) = state.objects.get_mut(&key) {
                    v["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
                }
                state.terminating.insert(key, gets);
            }
            _ => {
                state.objects.remove(&key);
            }
        }
        Ok(())
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, bool), ClusterError> {
        let state = self.inner.lock();
        if state.unknown_kinds.contains(&gvk.kind) {
            return Err(ClusterError::NotFound(format!(
                "no resource registered for {}/{} {}",
                gvk.group, gvk.version, gvk.kind
            )));
        }
        let plural = format!("{}s", gvk.kind.to_ascii_lowercase());
        let api = ApiResource::from_gvk_with_plural(gvk, &plural);
        Ok((api, !state.cluster_scoped.contains(&gvk.kind)))
    }
}
