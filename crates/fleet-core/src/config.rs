//! Control-plane configuration.
//!
//! Every section has a `Default` carrying the documented defaults and
//! [`FleetConfig::from_env`] overlays `FLEET_*` environment variables on
//! top. Unparsable values are logged and ignored.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How to reach the container runtime CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Program and leading args, e.g. `["docker", "compose"]`.
    pub binary: Vec<String>,
    pub compose_file: Option<PathBuf>,
    pub project_name: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub start_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    /// Added on top of the requested stop timeout before the call is abandoned.
    pub stop_buffer_secs: u64,
    pub status_timeout_secs: u64,
    pub logs_timeout_secs: u64,
    pub build_timeout_secs: u64,
    pub pull_timeout_secs: u64,
    /// Upper bound on concurrently running runtime/probe subprocesses.
    pub max_concurrent_commands: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            binary: vec!["docker".to_string(), "compose".to_string()],
            compose_file: None,
            project_name: None,
            working_dir: None,
            start_timeout_secs: 300,
            stop_timeout_secs: 30,
            stop_buffer_secs: 10,
            status_timeout_secs: 30,
            logs_timeout_secs: 30,
            build_timeout_secs: 900,
            pull_timeout_secs: 600,
            max_concurrent_commands: 4,
        }
    }
}

impl GatewayConfig {
    /// The command prefix shared by every runtime invocation.
    pub fn base_command(&self) -> Vec<String> {
        let mut cmd = self.binary.clone();
        if let Some(file) = &self.compose_file {
            cmd.push("-f".to_string());
            cmd.push(file.display().to_string());
        }
        if let Some(project) = &self.project_name {
            cmd.push("-p".to_string());
            cmd.push(project.clone());
        }
        cmd
    }
}

/// Startup orchestration knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Services started concurrently inside one wave.
    pub max_parallelism: usize,
    /// Fixed delay between start attempts.
    pub retry_delay_secs: u64,
    /// Poll interval while waiting for Hard dependencies.
    pub dependency_poll_interval_secs: u64,
    /// Deadline for the whole run.
    pub global_timeout_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 4,
            retry_delay_secs: 10,
            dependency_poll_interval_secs: 2,
            global_timeout_secs: 600,
        }
    }
}

impl OrchestrationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.dependency_poll_interval_secs.max(1))
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }
}

/// Health checking and validation knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Minimum aggregate score for the validation phase to pass.
    pub pass_threshold: f64,
    /// Results kept per service.
    pub history_limit: usize,
    /// Backoff between probe attempts.
    pub retry_backoff_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 75.0,
            history_limit: 100,
            retry_backoff_ms: 1000,
        }
    }
}

impl HealthConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Failure remediation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Master switch for executing eligible recovery actions.
    pub auto_recovery: bool,
    /// Timeout for a single recovery command.
    pub action_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_recovery: true,
            action_timeout_secs: 60,
        }
    }
}

/// Full control-plane configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    pub gateway: GatewayConfig,
    pub orchestration: OrchestrationConfig,
    pub health: HealthConfig,
    pub recovery: RecoveryConfig,
}

impl FleetConfig {
    /// Defaults overlaid with environment variables.
    ///
    /// Reads:
    /// - FLEET_COMPOSE_BINARY (whitespace separated, e.g. "docker compose")
    /// - FLEET_COMPOSE_FILE
    /// - FLEET_PROJECT
    /// - FLEET_MAX_PARALLELISM
    /// - FLEET_GLOBAL_TIMEOUT_SECS
    /// - FLEET_RETRY_DELAY_SECS
    /// - FLEET_HEALTH_THRESHOLD
    /// - FLEET_AUTO_RECOVERY ("true"/"false")
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(binary) = std::env::var("FLEET_COMPOSE_BINARY") {
            let parts: Vec<String> = binary.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                config.gateway.binary = parts;
            }
        }
        if let Ok(file) = std::env::var("FLEET_COMPOSE_FILE") {
            config.gateway.compose_file = Some(PathBuf::from(file));
        }
        if let Ok(project) = std::env::var("FLEET_PROJECT") {
            config.gateway.project_name = Some(project);
        }
        if let Some(n) = env_parse::<usize>("FLEET_MAX_PARALLELISM") {
            config.orchestration.max_parallelism = n.max(1);
        }
        if let Some(secs) = env_parse::<u64>("FLEET_GLOBAL_TIMEOUT_SECS") {
            config.orchestration.global_timeout_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("FLEET_RETRY_DELAY_SECS") {
            config.orchestration.retry_delay_secs = secs;
        }
        if let Some(threshold) = env_parse::<f64>("FLEET_HEALTH_THRESHOLD") {
            config.health.pass_threshold = threshold.clamp(0.0, 100.0);
        }
        if let Some(enabled) = env_parse::<bool>("FLEET_AUTO_RECOVERY") {
            config.recovery.auto_recovery = enabled;
        }

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
