//! Historized, scored health checking.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::HealthConfig;
use crate::domain::contract::{HealthCheckConfig, ServiceContract};
use crate::domain::error::{RuntimeError, RuntimeResult};
use crate::health::probes::ProbeExecutor;
use crate::health::result::{
    HealthCheckResult, HealthStatus, HealthTrend, ProbeOutcome, SystemHealthReport,
};
use crate::health::score::{health_score, STABILITY_WINDOW};
use crate::runtime::command::CommandRunner;

/// Health checking as seen by the orchestrator and coordinator.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    /// Run the contract's health check with retries and record the result.
    async fn check_service(&self, contract: &ServiceContract) -> HealthCheckResult;

    /// One attempt, no retries, no history.
    async fn probe_once(&self, config: &HealthCheckConfig) -> RuntimeResult<ProbeOutcome>;

    /// Check every contract concurrently and aggregate.
    async fn check_all_services(&self, contracts: &[ServiceContract]) -> SystemHealthReport {
        let results = join_all(contracts.iter().map(|c| self.check_service(c))).await;
        SystemHealthReport::from_results(contracts, &results)
    }
}

#[derive(Debug, Default)]
struct ServiceHealthState {
    history: VecDeque<HealthCheckResult>,
    consecutive_failures: u32,
}

/// Probe executor plus per-service history and failure counters.
#[derive(Debug)]
pub struct HealthChecker {
    probes: ProbeExecutor,
    config: HealthConfig,
    state: Mutex<HashMap<String, ServiceHealthState>>,
}

impl HealthChecker {
    pub fn new(config: HealthConfig, runner: CommandRunner) -> Self {
        Self {
            probes: ProbeExecutor::new(runner),
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Recorded results for `service`, oldest first.
    pub async fn history(&self, service: &str) -> Vec<HealthCheckResult> {
        let state = self.state.lock().await;
        state
            .get(service)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Uptime and latency over the recorded history.
    pub async fn trend(&self, service: &str) -> Option<HealthTrend> {
        let state = self.state.lock().await;
        let history = &state.get(service)?.history;
        let latest = history.back()?;
        let samples = history.len();
        let up = history.iter().filter(|r| r.status.is_available()).count();
        let total_ms: u64 = history.iter().map(|r| r.response_time_ms).sum();
        Some(HealthTrend {
            service_name: service.to_string(),
            samples,
            uptime_percent: up as f64 * 100.0 / samples as f64,
            mean_response_time_ms: total_ms as f64 / samples as f64,
            latest_status: latest.status,
        })
    }

    async fn run_attempts(
        &self,
        config: &HealthCheckConfig,
    ) -> (RuntimeResult<ProbeOutcome>, u32) {
        let attempts = config.attempts();
        let mut last = None;
        for attempt in 1..=attempts {
            match self.probes.probe(config).await {
                Ok(outcome) => return (Ok(outcome), attempt),
                Err(e) => {
                    debug!(attempt, attempts, error = %e, "health probe attempt failed");
                    last = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff()).await;
                    }
                }
            }
        }
        let err = last
            .unwrap_or_else(|| RuntimeError::InvalidCommand("no probe attempts made".to_string()));
        (Err(err), attempts)
    }
}

#[async_trait]
impl ServiceProbe for HealthChecker {
    #[instrument(skip(self, contract), fields(service = %contract.name))]
    async fn check_service(&self, contract: &ServiceContract) -> HealthCheckResult {
        let hc = &contract.health_check;
        let (outcome, attempts_made) = self.run_attempts(hc).await;

        // Probing happens without the lock; only the bookkeeping below holds it.
        let mut state = self.state.lock().await;
        let entry = state.entry(contract.name.clone()).or_default();

        let (status, response_time_ms, details, error, error_type) = match outcome {
            Ok(out) => {
                entry.consecutive_failures = 0;
                let status = if out.response_time_ms > hc.degraded_threshold_ms {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                (status, out.response_time_ms, out.details, None, None)
            }
            Err(e) => {
                entry.consecutive_failures += 1;
                let details = serde_json::json!({
                    "error": e.to_string(),
                    "error_type": e.kind(),
                    "attempts": attempts_made,
                });
                (
                    HealthStatus::Unhealthy,
                    0,
                    details,
                    Some(e.to_string()),
                    Some(e.kind().to_string()),
                )
            }
        };

        let mut recent: Vec<HealthStatus> = entry
            .history
            .iter()
            .rev()
            .take(STABILITY_WINDOW - 1)
            .map(|r| r.status)
            .collect();
        recent.reverse();
        recent.push(status);

        let result = HealthCheckResult {
            service_name: contract.name.clone(),
            status,
            response_time_ms,
            consecutive_failures: entry.consecutive_failures,
            score: health_score(status, response_time_ms, entry.consecutive_failures, &recent),
            details,
            error,
            error_type,
            timestamp: Utc::now(),
        };

        entry.history.push_back(result.clone());
        while entry.history.len() > self.config.history_limit.max(1) {
            entry.history.pop_front();
        }
        drop(state);

        match result.status {
            HealthStatus::Unhealthy => warn!(
                consecutive_failures = result.consecutive_failures,
                error = result.error.as_deref().unwrap_or_default(),
                "service unhealthy"
            ),
            status => info!(%status, response_time_ms, score = result.score, "service checked"),
        }
        result
    }

    async fn probe_once(&self, config: &HealthCheckConfig) -> RuntimeResult<ProbeOutcome> {
        self.probes.probe(config).await
    }
}
