//! Parsing of the runtime's machine-readable output.
//!
//! `ps --format json` emits one JSON object per line on current Compose
//! releases and a single JSON array on older ones; both are accepted.
//! Every field is optional, so a sparse record never fails the whole call.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Normalized health of a container as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Healthy,
    Unhealthy,
    /// Running without a configured healthcheck.
    Running,
    Starting,
    Failed,
    Unknown,
}

/// Map the runtime's `(State, Health)` pair onto [`RuntimeHealth`].
pub fn map_runtime_health(state: &str, health: &str) -> RuntimeHealth {
    let state = state.trim().to_ascii_lowercase();
    let health = health.trim().to_ascii_lowercase();
    match state.as_str() {
        "running" => match health.as_str() {
            "healthy" => RuntimeHealth::Healthy,
            "unhealthy" => RuntimeHealth::Unhealthy,
            "starting" => RuntimeHealth::Starting,
            _ => RuntimeHealth::Running,
        },
        "exited" | "dead" => RuntimeHealth::Failed,
        "restarting" => RuntimeHealth::Starting,
        _ => RuntimeHealth::Unknown,
    }
}

/// A published port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(rename = "TargetPort", default)]
    pub target_port: u16,
    #[serde(rename = "PublishedPort", default)]
    pub published_port: u16,
    #[serde(rename = "Protocol", default)]
    pub protocol: String,
}

#[derive(Debug, Deserialize)]
struct PsRecord {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Health", default)]
    health: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Publishers", default)]
    publishers: Option<Vec<Publisher>>,
    #[serde(rename = "CreatedAt", default)]
    created_at: Option<serde_json::Value>,
}

/// One container as reported by `ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRuntimeStatus {
    /// Container name (falls back to the service name when absent).
    pub name: String,
    pub id: String,
    pub service: String,
    pub state: String,
    pub health_raw: String,
    pub status_text: String,
    pub health: RuntimeHealth,
    pub ports: Vec<Publisher>,
    pub created_at: Option<String>,
}

impl From<PsRecord> for ServiceRuntimeStatus {
    fn from(rec: PsRecord) -> Self {
        let health = map_runtime_health(&rec.state, &rec.health);
        let created_at = rec.created_at.and_then(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let name = if rec.name.is_empty() {
            rec.service.clone()
        } else {
            rec.name
        };
        Self {
            name,
            id: rec.id,
            service: rec.service,
            state: rec.state,
            health_raw: rec.health,
            status_text: rec.status,
            health,
            ports: rec.publishers.unwrap_or_default(),
            created_at,
        }
    }
}

/// Parse `ps --format json` output. Unparsable lines are logged and skipped.
pub fn parse_ps_output(raw: &str) -> Vec<ServiceRuntimeStatus> {
    let mut out = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with('[') {
            match serde_json::from_str::<Vec<PsRecord>>(line) {
                Ok(records) => out.extend(records.into_iter().map(ServiceRuntimeStatus::from)),
                Err(e) => warn!(error = %e, "skipping unparsable ps array"),
            }
            continue;
        }
        match serde_json::from_str::<PsRecord>(line) {
            Ok(rec) => out.push(rec.into()),
            Err(e) => warn!(error = %e, line, "skipping unparsable ps line"),
        }
    }
    out
}

/// Resource usage snapshot from `stats --no-stream --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "CPUPerc", default)]
    pub cpu_percent: String,
    #[serde(rename = "MemUsage", default)]
    pub mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    pub mem_percent: String,
    #[serde(rename = "NetIO", default)]
    pub net_io: String,
    #[serde(rename = "BlockIO", default)]
    pub block_io: String,
    #[serde(rename = "PIDs", default)]
    pub pids: String,
}

impl ContainerStats {
    /// CPU usage as a number, e.g. `"12.5%"` → `12.5`.
    pub fn cpu(&self) -> Option<f64> {
        parse_percent(&self.cpu_percent)
    }

    pub fn memory(&self) -> Option<f64> {
        parse_percent(&self.mem_percent)
    }
}

fn parse_percent(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches('%').trim().parse().ok()
}

/// Parse `stats` output; same leniency as [`parse_ps_output`].
pub fn parse_stats_output(raw: &str) -> Vec<ContainerStats> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| match serde_json::from_str::<ContainerStats>(line) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, line, "skipping unparsable stats line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping_table() {
        assert_eq!(map_runtime_health("running", "healthy"), RuntimeHealth::Healthy);
        assert_eq!(map_runtime_health("running", "unhealthy"), RuntimeHealth::Unhealthy);
        assert_eq!(map_runtime_health("running", ""), RuntimeHealth::Running);
        assert_eq!(map_runtime_health("running", "starting"), RuntimeHealth::Starting);
        assert_eq!(map_runtime_health("exited", "healthy"), RuntimeHealth::Failed);
        assert_eq!(map_runtime_health("dead", ""), RuntimeHealth::Failed);
        assert_eq!(map_runtime_health("restarting", ""), RuntimeHealth::Starting);
        assert_eq!(map_runtime_health("paused", ""), RuntimeHealth::Unknown);
        assert_eq!(map_runtime_health("Running", "Healthy"), RuntimeHealth::Healthy);
    }

    #[test]
    fn test_parse_ndjson_skips_garbage() {
        let raw = r#"{"Name":"bot-redis-1","ID":"abc","Service":"redis","State":"running","Health":"healthy","Status":"Up 2 minutes","Publishers":[{"URL":"0.0.0.0","TargetPort":6379,"PublishedPort":6379,"Protocol":"tcp"}]}
not json at all
{"Service":"grafana","State":"exited"}
"#;
        let parsed = parse_ps_output(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].health, RuntimeHealth::Healthy);
        assert_eq!(parsed[0].ports[0].published_port, 6379);
        assert_eq!(parsed[1].name, "grafana");
        assert_eq!(parsed[1].health, RuntimeHealth::Failed);
    }

    #[test]
    fn test_parse_json_array_output() {
        let raw = r#"[{"Name":"a","State":"running"},{"Name":"b","State":"restarting","CreatedAt":1700000000}]"#;
        let parsed = parse_ps_output(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].health, RuntimeHealth::Running);
        assert_eq!(parsed[1].health, RuntimeHealth::Starting);
        assert_eq!(parsed[1].created_at.as_deref(), Some("1700000000"));
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_ps_output("").is_empty());
        assert!(parse_ps_output("\n  \n").is_empty());
    }

    #[test]
    fn test_parse_stats() {
        let raw = r#"{"Name":"bot-redis-1","CPUPerc":"1.25%","MemPerc":"3.10%","PIDs":"5"}"#;
        let stats = parse_stats_output(raw);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].cpu(), Some(1.25));
        assert_eq!(stats[0].memory(), Some(3.1));
        assert_eq!(stats[0].pids, "5");
    }
}
