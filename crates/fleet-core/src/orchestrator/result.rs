//! Orchestration run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contract::ServiceRole;
use crate::domain::state::{ServicePhase, ServiceRuntimeState};

/// Final state of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub name: String,
    pub role: ServiceRole,
    pub phase: ServicePhase,
    pub attempts: u32,
    pub duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub error_id: Option<String>,
    pub warnings: Vec<String>,
}

impl From<ServiceRuntimeState> for ServiceReport {
    fn from(state: ServiceRuntimeState) -> Self {
        Self {
            duration_ms: state.duration_ms(),
            name: state.name,
            role: state.role,
            phase: state.phase,
            attempts: state.attempts,
            last_error: state.last_error,
            error_id: state.error_id,
            warnings: state.warnings,
        }
    }
}

/// Immutable summary of one bring-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub run_id: String,
    /// No critical (Primary or Dependency) service ended outside Ready.
    pub success: bool,
    /// Waves as executed, remainder singletons included.
    pub waves: Vec<Vec<String>>,
    /// Services in the order they became Ready.
    pub startup_sequence: Vec<String>,
    /// Services started after the ordered waves because of a cycle.
    pub cyclic_remainder: Vec<String>,
    /// Per-service outcome, in declaration order.
    pub services: Vec<ServiceReport>,
    /// Every service that did not reach Ready.
    pub failed_services: Vec<String>,
    pub deadline_exceeded: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub recommendations: Vec<String>,
}

impl OrchestrationResult {
    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn phase_of(&self, name: &str) -> Option<ServicePhase> {
        self.service(name).map(|s| s.phase)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.phase_of(name) == Some(ServicePhase::Ready)
    }

    /// Failed services whose role is critical.
    pub fn critical_failures(&self) -> Vec<&ServiceReport> {
        self.services
            .iter()
            .filter(|s| s.role.is_critical() && s.phase != ServicePhase::Ready)
            .collect()
    }
}
