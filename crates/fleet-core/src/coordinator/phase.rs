//! Integration phases and their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::result::SystemHealthReport;
use crate::orchestrator::result::OrchestrationResult;

/// Phase of an integration run. Moves forward only; any phase may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationPhase {
    Initialization,
    DependencyCheck,
    ServiceStartup,
    HealthValidation,
    IntegrationTesting,
    MonitoringSetup,
    Completed,
    Failed,
}

impl IntegrationPhase {
    /// The working phases, in execution order.
    pub const SEQUENCE: [IntegrationPhase; 6] = [
        IntegrationPhase::Initialization,
        IntegrationPhase::DependencyCheck,
        IntegrationPhase::ServiceStartup,
        IntegrationPhase::HealthValidation,
        IntegrationPhase::IntegrationTesting,
        IntegrationPhase::MonitoringSetup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationPhase::Initialization => "initialization",
            IntegrationPhase::DependencyCheck => "dependency_check",
            IntegrationPhase::ServiceStartup => "service_startup",
            IntegrationPhase::HealthValidation => "health_validation",
            IntegrationPhase::IntegrationTesting => "integration_testing",
            IntegrationPhase::MonitoringSetup => "monitoring_setup",
            IntegrationPhase::Completed => "completed",
            IntegrationPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IntegrationPhase::Completed | IntegrationPhase::Failed)
    }

    /// Phase reached after `self` succeeds.
    pub fn next(&self) -> IntegrationPhase {
        match self {
            IntegrationPhase::Initialization => IntegrationPhase::DependencyCheck,
            IntegrationPhase::DependencyCheck => IntegrationPhase::ServiceStartup,
            IntegrationPhase::ServiceStartup => IntegrationPhase::HealthValidation,
            IntegrationPhase::HealthValidation => IntegrationPhase::IntegrationTesting,
            IntegrationPhase::IntegrationTesting => IntegrationPhase::MonitoringSetup,
            IntegrationPhase::MonitoringSetup | IntegrationPhase::Completed => {
                IntegrationPhase::Completed
            }
            IntegrationPhase::Failed => IntegrationPhase::Failed,
        }
    }

    /// Only the successor or `Failed` can follow a non-terminal phase.
    pub fn can_transition_to(&self, next: IntegrationPhase) -> bool {
        !self.is_terminal() && (next == self.next() || next == IntegrationPhase::Failed)
    }
}

impl std::fmt::Display for IntegrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub phase: IntegrationPhase,
    pub success: bool,
    pub message: String,
    /// Per-item findings; entries prefixed `warning:` did not fail the phase.
    pub diagnostics: Vec<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// The externally reported result of an integration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationReport {
    /// `Completed` or `Failed`.
    pub phase: IntegrationPhase,
    pub success: bool,
    /// One entry per executed phase, in order.
    pub results: Vec<IntegrationResult>,
    pub orchestration: Option<OrchestrationResult>,
    pub health: Option<SystemHealthReport>,
    pub recommendations: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl IntegrationReport {
    pub fn result(&self, phase: IntegrationPhase) -> Option<&IntegrationResult> {
        self.results.iter().find(|r| r.phase == phase)
    }

    /// The phase that halted the run, if any.
    pub fn failed_phase(&self) -> Option<IntegrationPhase> {
        self.results.iter().find(|r| !r.success).map(|r| r.phase)
    }
}
