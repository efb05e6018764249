//! Health check result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contract::ServiceRole;

/// Outcome classification of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Healthy or Degraded: the service answers.
    pub fn is_available(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A single successful probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub response_time_ms: u64,
    pub details: serde_json::Value,
}

/// Result of one `check_service` call (all attempts folded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service_name: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub consecutive_failures: u32,
    /// Score in `[0, 100]` computed against the history at check time.
    pub score: f64,
    pub details: serde_json::Value,
    /// Last probe error when the check ended Unhealthy.
    pub error: Option<String>,
    /// Type name of that error, fed to the classifier.
    pub error_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-service line of a [`SystemHealthReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthSummary {
    pub name: String,
    pub role: ServiceRole,
    pub status: HealthStatus,
    pub score: f64,
    pub response_time_ms: u64,
    pub consecutive_failures: u32,
    pub error: Option<String>,
}

/// Fleet-wide health snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthReport {
    pub status: HealthStatus,
    /// Mean of per-service scores (0 for an empty fleet).
    pub score: f64,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub services: Vec<ServiceHealthSummary>,
    pub timestamp: DateTime<Utc>,
}

impl SystemHealthReport {
    pub fn service(&self, name: &str) -> Option<&ServiceHealthSummary> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Rolling statistics over a service's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTrend {
    pub service_name: String,
    pub samples: usize,
    /// Share of available (Healthy or Degraded) results, in percent.
    pub uptime_percent: f64,
    pub mean_response_time_ms: f64,
    pub latest_status: HealthStatus,
}
