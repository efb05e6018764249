//! Declared service contracts.
//!
//! A [`ServiceContract`] is the immutable description of one fleet member:
//! its role, what it depends on, the capabilities it provides/requires and
//! how its health is probed.

use serde::{Deserialize, Serialize};

/// Default per-service startup budget.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 120;
/// Default number of start attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Role of a service within the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    Primary,
    Dependency,
    Monitoring,
    Support,
}

impl ServiceRole {
    /// Primary and Dependency services are critical: their failure fails the run.
    pub fn is_critical(&self) -> bool {
        matches!(self, ServiceRole::Primary | ServiceRole::Dependency)
    }
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceRole::Primary => "primary",
            ServiceRole::Dependency => "dependency",
            ServiceRole::Monitoring => "monitoring",
            ServiceRole::Support => "support",
        };
        f.write_str(s)
    }
}

/// Strength of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Constrains ordering; failure of the dependency aborts the dependent.
    Hard,
    /// Checked before start but never blocks it.
    Soft,
    /// Advisory only.
    Optional,
}

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencySpec {
    pub service: String,
    pub kind: DependencyKind,
}

/// Probe selection for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthCheckKind {
    /// GET `url`, expect 2xx and, when set, `expect_body` somewhere in the body.
    Http {
        url: String,
        expect_body: Option<String>,
    },
    /// Plain TCP connect.
    Tcp { host: String, port: u16 },
    /// Key-value store liveness (`PING` → `+PONG`).
    KeyValuePing { host: String, port: u16 },
    /// Shell command; exit code 0 is healthy.
    Command { command: String },
}

impl HealthCheckKind {
    /// Short human-readable target, used in logs and diagnostics.
    pub fn target(&self) -> String {
        match self {
            HealthCheckKind::Http { url, .. } => url.clone(),
            HealthCheckKind::Tcp { host, port } | HealthCheckKind::KeyValuePing { host, port } => {
                format!("{host}:{port}")
            }
            HealthCheckKind::Command { command } => command.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HealthCheckKind::Http { .. } => "http",
            HealthCheckKind::Tcp { .. } => "tcp",
            HealthCheckKind::KeyValuePing { .. } => "kv_ping",
            HealthCheckKind::Command { .. } => "command",
        }
    }
}

/// Health check configuration for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub kind: HealthCheckKind,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
    /// Attempts per check (at least one attempt is always made).
    pub retries: u32,
    /// A successful probe slower than this reports `Degraded`.
    pub degraded_threshold_ms: u64,
}

impl HealthCheckConfig {
    pub fn new(kind: HealthCheckKind) -> Self {
        Self {
            kind,
            timeout_secs: 5,
            retries: 3,
            degraded_threshold_ms: 2000,
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::new(HealthCheckKind::Http {
            url: url.into(),
            expect_body: None,
        })
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(HealthCheckKind::Tcp {
            host: host.into(),
            port,
        })
    }

    pub fn key_value_ping(host: impl Into<String>, port: u16) -> Self {
        Self::new(HealthCheckKind::KeyValuePing {
            host: host.into(),
            port,
        })
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::new(HealthCheckKind::Command {
            command: command.into(),
        })
    }

    /// Require `needle` in the HTTP body. No-op for other probe kinds.
    pub fn with_expected_body(mut self, needle: impl Into<String>) -> Self {
        if let HealthCheckKind::Http { expect_body, .. } = &mut self.kind {
            *expect_body = Some(needle.into());
        }
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_degraded_threshold_ms(mut self, ms: u64) -> Self {
        self.degraded_threshold_ms = ms;
        self
    }

    /// Number of attempts actually made per check.
    pub fn attempts(&self) -> u32 {
        self.retries.max(1)
    }
}

/// Immutable description of one fleet member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContract {
    pub name: String,
    pub role: ServiceRole,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    pub health_check: HealthCheckConfig,
    pub startup_timeout_secs: u64,
    pub max_attempts: u32,
}

impl ServiceContract {
    pub fn new(name: impl Into<String>, role: ServiceRole, health_check: HealthCheckConfig) -> Self {
        Self {
            name: name.into(),
            role,
            dependencies: Vec::new(),
            provides: Vec::new(),
            requires: Vec::new(),
            health_check,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn depends_on(mut self, service: impl Into<String>, kind: DependencyKind) -> Self {
        self.dependencies.push(DependencySpec {
            service: service.into(),
            kind,
        });
        self
    }

    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        self.provides.push(capability.into());
        self
    }

    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.requires.push(capability.into());
        self
    }

    pub fn with_startup_timeout_secs(mut self, secs: u64) -> Self {
        self.startup_timeout_secs = secs;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Dependencies of a given kind.
    pub fn dependencies_of(&self, kind: DependencyKind) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(move |d| d.kind == kind)
            .map(|d| d.service.as_str())
    }

    pub fn is_critical(&self) -> bool {
        self.role.is_critical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_dependencies_by_kind() {
        let c = ServiceContract::new(
            "bot",
            ServiceRole::Primary,
            HealthCheckConfig::tcp("localhost", 8080),
        )
        .depends_on("redis", DependencyKind::Hard)
        .depends_on("prometheus", DependencyKind::Soft)
        .depends_on("jaeger", DependencyKind::Optional);

        let hard: Vec<_> = c.dependencies_of(DependencyKind::Hard).collect();
        let soft: Vec<_> = c.dependencies_of(DependencyKind::Soft).collect();
        assert_eq!(hard, vec!["redis"]);
        assert_eq!(soft, vec!["prometheus"]);
        assert_eq!(c.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(c.is_critical());
    }

    #[test]
    fn test_attempts_is_at_least_one() {
        let cfg = HealthCheckConfig::command("true").with_retries(0);
        assert_eq!(cfg.attempts(), 1);
    }

    #[test]
    fn test_expected_body_only_applies_to_http() {
        let cfg = HealthCheckConfig::tcp("localhost", 1).with_expected_body("ok");
        assert_eq!(cfg.kind, HealthCheckKind::Tcp { host: "localhost".into(), port: 1 });

        let cfg = HealthCheckConfig::http("http://x/health").with_expected_body("ok");
        assert!(matches!(cfg.kind, HealthCheckKind::Http { expect_body: Some(_), .. }));
    }

    #[test]
    fn test_monitoring_role_is_not_critical() {
        assert!(!ServiceRole::Monitoring.is_critical());
        assert!(!ServiceRole::Support.is_critical());
        assert!(ServiceRole::Dependency.is_critical());
    }
}
