// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::ValueEnum;
use gr_core::CliConfig;
use gr_engine::session::SessionInfo;
use serde::Serialize;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRow<'a> {
    name: &'a str,
    namespace: &'a str,
    ready: bool,
    command: &'a str,
    cli_version: &'a str,
    port_forwards: &'a str,
    flux_namespace: &'a str,
    automation_kind: &'a str,
}

impl<'a> From<&'a SessionInfo> for SessionRow<'a> {
    fn from(s: &'a SessionInfo) -> Self {
        Self {
            name: &s.name,
            namespace: &s.namespace,
            ready: s.ready,
            command: &s.command,
            cli_version: &s.cli_version,
            port_forwards: &s.port_forwards,
            flux_namespace: &s.flux_namespace,
            automation_kind: &s.automation_kind,
        }
    }
}

/// Render sessions as an aligned table or a JSON array.
pub fn format_sessions(sessions: &[SessionInfo], format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        let rows: Vec<SessionRow<'_>> = sessions.iter().map(SessionRow::from).collect();
        return Ok(serde_json::to_string_pretty(&rows)?);
    }
    if sessions.is_empty() {
        return Ok("No sessions found\n".to_string());
    }

    let name_width = sessions.iter().map(|s| s.name.len()).max().unwrap_or(0).max(4);
    let ns_width = sessions.iter().map(|s| s.namespace.len()).max().unwrap_or(0).max(9);
    let mut out = format!(
        "{}\n",
        crate::color::header(&format!("{:<name_width$}  {:<ns_width$}  {:<7}  COMMAND", "NAME", "NAMESPACE", "STATE"))
    );
    for s in sessions {
        // Pad before coloring so escape codes don't skew the columns.
        let state = format!("{:<7}", if s.ready { "ready" } else { "pending" });
        let state = state.replacen(state.trim_end(), &crate::color::readiness(s.ready), 1);
        out.push_str(&format!("{:<name_width$}  {:<ns_width$}  {state}  {}\n", s.name, s.namespace, s.command));
    }
    Ok(out)
}

pub fn format_config(config: &CliConfig, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        OutputFormat::Text => Ok(format!("analytics: {}\nuserId: {}\n", config.analytics, config.user_id)),
    }
}
