//! Health scoring and fleet-level aggregation.

use chrono::Utc;

use crate::domain::contract::{ServiceContract, ServiceRole};
use crate::health::result::{
    HealthCheckResult, HealthStatus, ServiceHealthSummary, SystemHealthReport,
};

/// Results considered for the stability factor.
pub const STABILITY_WINDOW: usize = 5;

const SLOW_RESPONSE_MS: u64 = 2_000;
const VERY_SLOW_RESPONSE_MS: u64 = 5_000;
const FAILURE_PENALTY: f64 = 10.0;
const MAX_FAILURE_PENALTY: f64 = 50.0;

const UNHEALTHY_FRACTION_LIMIT: f64 = 0.30;
const DEGRADED_FRACTION_LIMIT: f64 = 0.20;

fn base_score(status: HealthStatus) -> f64 {
    match status {
        HealthStatus::Healthy => 100.0,
        HealthStatus::Degraded => 70.0,
        HealthStatus::Unhealthy => 30.0,
        HealthStatus::Unknown => 50.0,
    }
}

/// Score one check result.
///
/// `recent` holds the most recent statuses, newest last, including the one
/// being scored. The stability factor applies only once a full window is
/// available.
pub fn health_score(
    status: HealthStatus,
    response_time_ms: u64,
    consecutive_failures: u32,
    recent: &[HealthStatus],
) -> f64 {
    let mut score = base_score(status);

    if recent.len() >= STABILITY_WINDOW {
        let window = &recent[recent.len() - STABILITY_WINDOW..];
        let healthy = window.iter().filter(|s| **s == HealthStatus::Healthy).count();
        score *= healthy as f64 / STABILITY_WINDOW as f64;
    }

    if response_time_ms > VERY_SLOW_RESPONSE_MS {
        score *= 0.8;
    } else if response_time_ms > SLOW_RESPONSE_MS {
        score *= 0.9;
    }

    score -= (consecutive_failures as f64 * FAILURE_PENALTY).min(MAX_FAILURE_PENALTY);
    score.clamp(0.0, 100.0)
}

/// Fold per-service statuses into one fleet status.
pub fn system_status(services: &[(ServiceRole, HealthStatus)]) -> HealthStatus {
    if services.is_empty() {
        return HealthStatus::Unknown;
    }
    let critical_down = services
        .iter()
        .any(|(role, status)| role.is_critical() && *status == HealthStatus::Unhealthy);
    if critical_down {
        return HealthStatus::Unhealthy;
    }

    let total = services.len() as f64;
    let unhealthy = services
        .iter()
        .filter(|(_, s)| *s == HealthStatus::Unhealthy)
        .count();
    let degraded = services
        .iter()
        .filter(|(_, s)| *s == HealthStatus::Degraded)
        .count();

    if unhealthy as f64 / total > UNHEALTHY_FRACTION_LIMIT {
        HealthStatus::Unhealthy
    } else if unhealthy > 0 || degraded as f64 / total > DEGRADED_FRACTION_LIMIT {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

impl SystemHealthReport {
    /// Build the report from results paired with their contracts by name.
    /// Contracts without a result count as Unknown.
    pub fn from_results(contracts: &[ServiceContract], results: &[HealthCheckResult]) -> Self {
        let services: Vec<ServiceHealthSummary> = contracts
            .iter()
            .map(|contract| {
                match results.iter().find(|r| r.service_name == contract.name) {
                    Some(r) => ServiceHealthSummary {
                        name: contract.name.clone(),
                        role: contract.role,
                        status: r.status,
                        score: r.score,
                        response_time_ms: r.response_time_ms,
                        consecutive_failures: r.consecutive_failures,
                        error: r.error.clone(),
                    },
                    None => ServiceHealthSummary {
                        name: contract.name.clone(),
                        role: contract.role,
                        status: HealthStatus::Unknown,
                        score: health_score(HealthStatus::Unknown, 0, 0, &[]),
                        response_time_ms: 0,
                        consecutive_failures: 0,
                        error: None,
                    },
                }
            })
            .collect();

        let pairs: Vec<(ServiceRole, HealthStatus)> =
            services.iter().map(|s| (s.role, s.status)).collect();
        let score = if services.is_empty() {
            0.0
        } else {
            services.iter().map(|s| s.score).sum::<f64>() / services.len() as f64
        };
        let count = |status: HealthStatus| services.iter().filter(|s| s.status == status).count();

        Self {
            status: system_status(&pairs),
            score,
            healthy: count(HealthStatus::Healthy),
            degraded: count(HealthStatus::Degraded),
            unhealthy: count(HealthStatus::Unhealthy),
            services,
            timestamp: Utc::now(),
        }
    }
}
