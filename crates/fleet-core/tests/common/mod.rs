//! In-process fakes for the runtime and health seams.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleet_core::{
    CommandOutput, CommandRunner, ContainerRuntime, GatewayConfig, HealthCheckConfig,
    HealthCheckResult, HealthStatus, OrchestrationConfig, ProbeOutcome, RecoveryAdvisor,
    RecoveryConfig, RuntimeError, RuntimeResult, ServiceContract, ServiceProbe, ServiceRole,
    ServiceRuntimeStatus, StartOptions,
};
use fleet_state::fakes::MemoryErrorStore;

/// Contract whose health target is its own name, so fakes can key on it.
pub fn service(name: &str, role: ServiceRole) -> ServiceContract {
    ServiceContract::new(name, role, HealthCheckConfig::command(name))
}

pub fn fast_config() -> OrchestrationConfig {
    OrchestrationConfig {
        max_parallelism: 4,
        retry_delay_secs: 1,
        dependency_poll_interval_secs: 1,
        global_timeout_secs: 600,
    }
}

/// Advisor over an in-memory store with execution switched off, so no
/// subprocess runs under paused time.
pub fn advisor(store: Arc<MemoryErrorStore>) -> Arc<RecoveryAdvisor> {
    Arc::new(RecoveryAdvisor::new(
        store,
        CommandRunner::new(1),
        GatewayConfig {
            binary: vec!["true".to_string()],
            ..GatewayConfig::default()
        },
        RecoveryConfig {
            auto_recovery: false,
            action_timeout_secs: 5,
        },
    ))
}

#[derive(Default)]
pub struct FakeRuntime {
    start_delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    version_down: bool,
    starts: Mutex<Vec<String>>,
    stops: Mutex<u32>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_delay(mut self, service: &str, delay: Duration) -> Self {
        self.start_delays.insert(service.to_string(), delay);
        self
    }

    pub fn failing(mut self, service: &str) -> Self {
        self.failing.insert(service.to_string());
        self
    }

    pub fn without_runtime(mut self) -> Self {
        self.version_down = true;
        self
    }

    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    pub fn starts_of(&self, service: &str) -> usize {
        self.starts().iter().filter(|s| *s == service).count()
    }

    pub fn stop_calls(&self) -> u32 {
        *self.stops.lock().unwrap()
    }

    fn output(command: String) -> CommandOutput {
        CommandOutput {
            command,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start(
        &self,
        services: &[String],
        _options: &StartOptions,
    ) -> RuntimeResult<CommandOutput> {
        let name = services.join(" ");
        self.starts.lock().unwrap().extend(services.iter().cloned());
        if let Some(delay) = self.start_delays.get(&name) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker compose up -d {name}"),
                exit_code: 1,
                stderr: "container exited with code 1".to_string(),
            });
        }
        Ok(Self::output(format!("docker compose up -d {name}")))
    }

    async fn stop(&self, _timeout: Duration) -> RuntimeResult<CommandOutput> {
        *self.stops.lock().unwrap() += 1;
        Ok(Self::output("docker compose down".to_string()))
    }

    async fn status(&self) -> RuntimeResult<Vec<ServiceRuntimeStatus>> {
        Ok(Vec::new())
    }

    async fn logs(&self, _service: Option<&str>, _tail: Option<usize>) -> RuntimeResult<String> {
        Ok(String::new())
    }

    async fn version(&self) -> RuntimeResult<String> {
        if self.version_down {
            return Err(RuntimeError::BinaryNotFound {
                binary: "docker".to_string(),
            });
        }
        Ok("Docker Compose version v2.24.6".to_string())
    }
}

#[derive(Default)]
pub struct FakeProbe {
    unhealthy: HashSet<String>,
    unreachable: HashSet<String>,
    checks: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unhealthy(mut self, service: &str) -> Self {
        self.unhealthy.insert(service.to_string());
        self
    }

    /// `probe_once` fails for this health target.
    pub fn unreachable(mut self, target: &str) -> Self {
        self.unreachable.insert(target.to_string());
        self
    }

    pub fn checks_of(&self, service: &str) -> usize {
        self.checks
            .lock()
            .unwrap()
            .iter()
            .filter(|s| *s == service)
            .count()
    }
}

#[async_trait]
impl ServiceProbe for FakeProbe {
    async fn check_service(&self, contract: &ServiceContract) -> HealthCheckResult {
        self.checks.lock().unwrap().push(contract.name.clone());
        let healthy = !self.unhealthy.contains(&contract.name);
        HealthCheckResult {
            service_name: contract.name.clone(),
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            response_time_ms: 5,
            consecutive_failures: u32::from(!healthy),
            score: if healthy { 100.0 } else { 20.0 },
            details: serde_json::Value::Null,
            error: (!healthy).then(|| "connection refused".to_string()),
            error_type: (!healthy).then(|| "ConnectionError".to_string()),
            timestamp: Utc::now(),
        }
    }

    async fn probe_once(&self, config: &HealthCheckConfig) -> RuntimeResult<ProbeOutcome> {
        let target = config.kind.target();
        if self.unreachable.contains(&target) {
            return Err(RuntimeError::Connection {
                target,
                reason: "connection refused".to_string(),
            });
        }
        Ok(ProbeOutcome {
            response_time_ms: 1,
            details: serde_json::Value::Null,
        })
    }
}
