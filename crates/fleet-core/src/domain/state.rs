//! Per-service runtime state tracked during one orchestration run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contract::ServiceRole;

/// Startup phase of a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicePhase {
    Pending,
    Initializing,
    Starting,
    HealthCheck,
    Ready,
    Failed,
    TimedOut,
}

impl ServicePhase {
    /// Ready, Failed and TimedOut are final for a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServicePhase::Ready | ServicePhase::Failed | ServicePhase::TimedOut
        )
    }

    /// Failed or TimedOut: a Hard dependent can no longer be started.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, ServicePhase::Failed | ServicePhase::TimedOut)
    }

    fn rank(&self) -> u8 {
        match self {
            ServicePhase::Pending => 0,
            ServicePhase::Initializing => 1,
            ServicePhase::Starting => 2,
            ServicePhase::HealthCheck => 3,
            ServicePhase::Ready | ServicePhase::Failed | ServicePhase::TimedOut => 4,
        }
    }

    /// Phases only move forward, except a failed health check going back
    /// to Starting for the next attempt. Terminal phases never change.
    pub fn can_transition_to(&self, next: ServicePhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
            || (*self == ServicePhase::HealthCheck && next == ServicePhase::Starting)
    }
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServicePhase::Pending => "pending",
            ServicePhase::Initializing => "initializing",
            ServicePhase::Starting => "starting",
            ServicePhase::HealthCheck => "health_check",
            ServicePhase::Ready => "ready",
            ServicePhase::Failed => "failed",
            ServicePhase::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Mutable runtime state of one service. Written only by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRuntimeState {
    pub name: String,
    pub role: ServiceRole,
    pub phase: ServicePhase,
    pub attempts: u32,
    pub first_started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Failure-log id of the last classified error.
    pub error_id: Option<String>,
    pub warnings: Vec<String>,
}

impl ServiceRuntimeState {
    pub fn new(name: impl Into<String>, role: ServiceRole) -> Self {
        Self {
            name: name.into(),
            role,
            phase: ServicePhase::Pending,
            attempts: 0,
            first_started_at: None,
            finished_at: None,
            last_error: None,
            error_id: None,
            warnings: Vec::new(),
        }
    }

    /// Move to `phase`, stamping start/finish times.
    pub fn enter(&mut self, phase: ServicePhase) {
        if phase == ServicePhase::Starting && self.first_started_at.is_none() {
            self.first_started_at = Some(Utc::now());
        }
        if phase.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.phase = phase;
    }

    /// Milliseconds between first start and finish, if both happened.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.first_started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_stamps_times() {
        let mut state = ServiceRuntimeState::new("redis", ServiceRole::Dependency);
        assert!(state.first_started_at.is_none());
        state.enter(ServicePhase::Starting);
        assert!(state.first_started_at.is_some());
        state.enter(ServicePhase::Ready);
        assert!(state.finished_at.is_some());
        assert!(state.duration_ms().is_some());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(ServicePhase::Ready.is_terminal());
        assert!(ServicePhase::TimedOut.is_terminal());
        assert!(!ServicePhase::HealthCheck.is_terminal());
        assert!(ServicePhase::Failed.is_unsatisfiable());
        assert!(!ServicePhase::Ready.is_unsatisfiable());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        use ServicePhase::*;
        assert!(Pending.can_transition_to(Initializing));
        assert!(Pending.can_transition_to(TimedOut));
        assert!(Initializing.can_transition_to(Failed));
        assert!(HealthCheck.can_transition_to(Starting));
        assert!(!Starting.can_transition_to(Initializing));
        assert!(!Ready.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Starting));
    }
}
