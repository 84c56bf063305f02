// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_yaml::{Mapping, Value};

use crate::EngineError;

/// API server port assumed when the published server URL carries none.
const DEFAULT_REMOTE_PORT: u16 = 8443;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKubeconfig {
    pub yaml: String,
    /// Port the virtual cluster's API server listens on inside its pod.
    pub remote_port: u16,
}

fn invalid(message: impl std::fmt::Display) -> EngineError {
    EngineError::Session(format!("invalid session kubeconfig: {message}"))
}

fn single<'a>(doc: &'a mut Value, key: &str) -> Result<&'a mut Mapping, EngineError> {
    let seq = doc
        .get_mut(key)
        .and_then(Value::as_sequence_mut)
        .ok_or_else(|| invalid(format!("no {key}")))?;
    if seq.len() != 1 {
        return Err(invalid(format!("expected exactly one entry in {key}, found {}", seq.len())));
    }
    seq[0].as_mapping_mut().ok_or_else(|| invalid(format!("{key}[0] is not a mapping")))
}

fn port_of(server: &str) -> Result<u16, EngineError> {
    let authority = server.split_once("://").map_or(server, |(_, rest)| rest);
    let authority = authority.split('/').next().unwrap_or_default();
    match authority.rsplit_once(':') {
        Some((_, port)) if !port.ends_with(']') => {
            port.parse().map_err(|_| invalid(format!("bad port in server {server:?}")))
        }
        _ => Ok(DEFAULT_REMOTE_PORT),
    }
}

/// Rename the single cluster, context and user to `session`, point the
/// server at the local forward, and return the remote API port.
pub fn rewrite_kubeconfig(raw: &str, session: &str, local_port: u16) -> Result<SessionKubeconfig, EngineError> {
    let mut doc: Value = serde_yaml::from_str(raw).map_err(invalid)?;
    let name = Value::from(session);

    let cluster = single(&mut doc, "clusters")?;
    cluster.insert("name".into(), name.clone());
    let details = cluster
        .get_mut("cluster")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| invalid("clusters[0] has no cluster"))?;
    let server = details.get("server").and_then(Value::as_str).unwrap_or_default();
    let remote_port = port_of(server)?;
    details.insert("server".into(), Value::from(format!("https://localhost:{local_port}")));

    let user = single(&mut doc, "users")?;
    user.insert("name".into(), name.clone());

    let context = single(&mut doc, "contexts")?;
    context.insert("name".into(), name.clone());
    let details = context
        .get_mut("context")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| invalid("contexts[0] has no context"))?;
    details.insert("cluster".into(), name.clone());
    details.insert("user".into(), name.clone());

    if let Some(map) = doc.as_mapping_mut() {
        map.insert("current-context".into(), name);
    }
    let yaml = serde_yaml::to_string(&doc).map_err(invalid)?;
    Ok(SessionKubeconfig { yaml, remote_port })
}

#[cfg(test)]
#[path = "kubeconfig_tests.rs"]
mod tests;
