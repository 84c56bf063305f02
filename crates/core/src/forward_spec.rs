// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `--port-forward` spec parsing.
//!
//! Format: `port=HOST:CONTAINER,resource=KIND/NAME[,namespace=NS]`.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForwardSpecError {
    #[error("invalid port forward spec: {0}")]
    Malformed(String),

    #[error("invalid port mapping {0:?}: expected HOST:CONTAINER")]
    Port(String),

    #[error("invalid resource {0:?}: expected KIND/NAME")]
    Resource(String),

    #[error("unsupported spec kind {0:?}")]
    UnsupportedKind(String),

    #[error("port forward spec {0:?} is missing {1}")]
    Missing(String, &'static str),
}

/// Kind of object a forward resolves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pod,
    Service,
    Deployment,
}

crate::simple_display! {
    ResourceKind {
        Pod => "pod",
        Service => "service",
        Deployment => "deployment",
    }
}

impl FromStr for ResourceKind {
    type Err = ForwardSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "po" | "pod" | "pods" => Ok(Self::Pod),
            "svc" | "service" | "services" => Ok(Self::Service),
            "deploy" | "deployment" | "deployments" => Ok(Self::Deployment),
            other => Err(ForwardSpecError::UnsupportedKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortForwardSpec {
    pub namespace: String,
    pub name: String,
    pub kind: ResourceKind,
    pub host_port: u16,
    pub container_port: u16,
}

impl PortForwardSpec {
    /// Parse `spec`, using `default_namespace` when none is given.
    pub fn parse(spec: &str, default_namespace: &str) -> Result<Self, ForwardSpecError> {
        let mut namespace = default_namespace.to_string();
        let mut ports = None;
        let mut resource = None;

        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) =
                pair.split_once('=').ok_or_else(|| ForwardSpecError::Malformed(spec.to_string()))?;
            match key {
                "port" => ports = Some(parse_ports(value)?),
                "resource" => {
                    let (kind, name) = value
                        .split_once('/')
                        .filter(|(k, n)| !k.is_empty() && !n.is_empty() && !n.contains('/'))
                        .ok_or_else(|| ForwardSpecError::Resource(value.to_string()))?;
                    resource = Some((kind.parse::<ResourceKind>()?, name.to_string()));
                }
                "namespace" => namespace = value.to_string(),
                // Unknown keys are accepted for forward compatibility.
                _ => tracing::debug!(%key, "ignoring unknown port forward key"),
            }
        }

        let (host_port, container_port) =
            ports.ok_or_else(|| ForwardSpecError::Missing(spec.to_string(), "port"))?;
        let (kind, name) =
            resource.ok_or_else(|| ForwardSpecError::Missing(spec.to_string(), "resource"))?;
        Ok(Self { namespace, name, kind, host_port, container_port })
    }
}

fn parse_ports(value: &str) -> Result<(u16, u16), ForwardSpecError> {
    let bad = || ForwardSpecError::Port(value.to_string());
    let (host, container) = value.split_once(':').ok_or_else(bad)?;
    let host = host.parse::<u16>().map_err(|_| bad())?;
    let container = container.parse::<u16>().map_err(|_| bad())?;
    Ok((host, container))
}

#[cfg(test)]
#[path = "forward_spec_tests.rs"]
mod tests;
