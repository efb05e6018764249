//! Shared state for one orchestration run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::contract::ServiceContract;
use crate::domain::error::{FleetError, Result};
use crate::domain::state::{ServicePhase, ServiceRuntimeState};
use crate::obs;

/// Phase map plus run-wide deadline. Passed explicitly to every service
/// task; nothing here is global.
#[derive(Debug)]
pub struct OrchestrationContext {
    run_id: String,
    /// `None` when the budget reaches past what `Instant` can represent.
    deadline: Option<Instant>,
    deadline_hit: AtomicBool,
    states: RwLock<HashMap<String, ServiceRuntimeState>>,
    /// Services in the order they reached Ready.
    ready_order: RwLock<Vec<String>>,
    recommendations: RwLock<Vec<String>>,
}

impl OrchestrationContext {
    pub fn new(run_id: impl Into<String>, contracts: &[ServiceContract], budget: Duration) -> Self {
        let states = contracts
            .iter()
            .map(|c| (c.name.clone(), ServiceRuntimeState::new(c.name.clone(), c.role)))
            .collect();
        Self {
            run_id: run_id.into(),
            deadline: Instant::now().checked_add(budget),
            deadline_hit: AtomicBool::new(false),
            states: RwLock::new(states),
            ready_order: RwLock::new(Vec::new()),
            recommendations: RwLock::new(Vec::new()),
        }
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Record that the deadline cut the run short.
    pub fn mark_deadline_hit(&self) {
        self.deadline_hit.store(true, Ordering::SeqCst);
    }

    pub fn deadline_hit(&self) -> bool {
        self.deadline_hit.load(Ordering::SeqCst)
    }

    pub async fn phase(&self, service: &str) -> Option<ServicePhase> {
        self.states.read().await.get(service).map(|s| s.phase)
    }

    /// Move `service` to `next`, rejecting backward moves.
    pub async fn transition(&self, service: &str, next: ServicePhase) -> Result<()> {
        let from = {
            let mut states = self.states.write().await;
            let state = states
                .get_mut(service)
                .ok_or_else(|| FleetError::UnknownService(service.to_string()))?;
            let from = state.phase;
            if from == next {
                return Ok(());
            }
            if !from.can_transition_to(next) {
                return Err(FleetError::IllegalTransition {
                    from: from.to_string(),
                    to: next.to_string(),
                });
            }
            state.enter(next);
            from
        };
        if next == ServicePhase::Ready {
            self.ready_order.write().await.push(service.to_string());
        }
        obs::emit_phase_changed(&self.run_id, service, from, next);
        Ok(())
    }

    /// Apply `f` to the state of `service` (no-op for unknown services).
    pub async fn update<F>(&self, service: &str, f: F)
    where
        F: FnOnce(&mut ServiceRuntimeState),
    {
        if let Some(state) = self.states.write().await.get_mut(service) {
            f(state);
        }
    }

    pub async fn warn(&self, service: &str, warning: impl Into<String>) {
        let warning = warning.into();
        self.update(service, |s| s.warnings.push(warning)).await;
    }

    pub async fn add_recommendations(&self, steps: impl IntoIterator<Item = String>) {
        let mut recs = self.recommendations.write().await;
        for step in steps {
            if !recs.contains(&step) {
                recs.push(step);
            }
        }
    }

    /// Every service still Pending or Initializing becomes TimedOut.
    pub async fn time_out_unstarted(&self, reason: &str) -> Vec<String> {
        let mut timed_out: Vec<(String, ServicePhase)> = Vec::new();
        {
            let mut states = self.states.write().await;
            for state in states.values_mut() {
                if matches!(state.phase, ServicePhase::Pending | ServicePhase::Initializing) {
                    timed_out.push((state.name.clone(), state.phase));
                    state.enter(ServicePhase::TimedOut);
                    state.last_error = Some(reason.to_string());
                }
            }
        }
        timed_out.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, from) in &timed_out {
            obs::emit_phase_changed(&self.run_id, name, *from, ServicePhase::TimedOut);
        }
        timed_out.into_iter().map(|(name, _)| name).collect()
    }

    pub async fn snapshot(&self) -> HashMap<String, ServiceRuntimeState> {
        self.states.read().await.clone()
    }

    pub async fn ready_order(&self) -> Vec<String> {
        self.ready_order.read().await.clone()
    }

    pub async fn recommendations(&self) -> Vec<String> {
        self.recommendations.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::{HealthCheckConfig, ServiceRole};

    fn ctx() -> OrchestrationContext {
        let contracts = vec![
            ServiceContract::new("a", ServiceRole::Primary, HealthCheckConfig::command("true")),
            ServiceContract::new("b", ServiceRole::Support, HealthCheckConfig::command("true")),
        ];
        OrchestrationContext::new("run-1", &contracts, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_transition_rules_enforced() {
        let ctx = ctx();
        ctx.transition("a", ServicePhase::Initializing).await.unwrap();
        ctx.transition("a", ServicePhase::Starting).await.unwrap();
        let err = ctx
            .transition("a", ServicePhase::Initializing)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::IllegalTransition { .. }));
        assert!(matches!(
            ctx.transition("ghost", ServicePhase::Ready).await,
            Err(FleetError::UnknownService(_))
        ));
    }

    #[tokio::test]
    async fn test_ready_order_recorded() {
        let ctx = ctx();
        for phase in [
            ServicePhase::Initializing,
            ServicePhase::Starting,
            ServicePhase::HealthCheck,
            ServicePhase::Ready,
        ] {
            ctx.transition("b", phase).await.unwrap();
        }
        assert_eq!(ctx.ready_order().await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_time_out_unstarted() {
        let ctx = ctx();
        ctx.transition("a", ServicePhase::Initializing).await.unwrap();
        let timed_out = ctx.time_out_unstarted("deadline").await;
        assert_eq!(timed_out, vec!["a", "b"]);
        assert_eq!(ctx.phase("a").await, Some(ServicePhase::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_tracks_virtual_time() {
        let contracts = vec![];
        let ctx = OrchestrationContext::new("run-2", &contracts, Duration::from_secs(5));
        assert!(!ctx.deadline_exceeded());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(ctx.deadline_exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_budget_means_no_deadline() {
        let ctx = OrchestrationContext::new("run-3", &[], Duration::from_secs(u64::MAX));
        assert!(!ctx.deadline_exceeded());
        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(!ctx.deadline_exceeded());
    }

    #[tokio::test]
    async fn test_recommendations_deduplicated() {
        let ctx = ctx();
        ctx.add_recommendations(vec!["restart".to_string(), "restart".to_string()])
            .await;
        assert_eq!(ctx.recommendations().await.len(), 1);
    }
}
