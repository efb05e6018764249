//! Wave-by-wave fleet bring-up.
//!
//! Waves run sequentially; services inside a wave start concurrently,
//! bounded by `max_parallelism`. Each service walks
//! `Pending → Initializing → Starting → HealthCheck → Ready`, or ends in
//! `Failed` (exhausted attempts, unsatisfiable Hard dependency) or
//! `TimedOut` (its own startup budget or the run deadline).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::OrchestrationConfig;
use crate::domain::contract::{DependencyKind, ServiceContract};
use crate::domain::error::RuntimeResult;
use crate::domain::state::ServicePhase;
use crate::health::checker::ServiceProbe;
use crate::obs;
use crate::orchestrator::context::OrchestrationContext;
use crate::orchestrator::graph::{DependencyGraph, WavePlan};
use crate::orchestrator::result::{OrchestrationResult, ServiceReport};
use crate::recovery::advisor::RecoveryAdvisor;
use crate::recovery::classifier::FailureReport;
use crate::runtime::command::CommandOutput;
use crate::runtime::gateway::{ContainerRuntime, StartOptions};

const DEADLINE_REASON: &str = "global orchestration deadline exceeded";

enum DependencyWait {
    Ready,
    Unsatisfiable(ServicePhase),
    TimedOut,
    DeadlineExceeded,
}

enum AttemptOutcome {
    Ready,
    Exhausted,
    DeadlineExceeded,
}

/// Read-only lookups shared by the service tasks of one run.
struct RunPlan<'a> {
    contracts: HashMap<&'a str, &'a ServiceContract>,
    remainder: HashSet<&'a str>,
}

/// Starts a fleet in dependency order.
pub struct StartupOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn ServiceProbe>,
    advisor: Arc<RecoveryAdvisor>,
    config: OrchestrationConfig,
    start_options: StartOptions,
}

impl StartupOrchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ServiceProbe>,
        advisor: Arc<RecoveryAdvisor>,
        config: OrchestrationConfig,
    ) -> Self {
        Self {
            runtime,
            probe,
            advisor,
            config,
            start_options: StartOptions::default(),
        }
    }

    pub fn with_start_options(mut self, options: StartOptions) -> Self {
        self.start_options = options;
        self
    }

    /// Wave plan for `contracts` without starting anything.
    pub fn plan(&self, contracts: &[ServiceContract]) -> WavePlan {
        DependencyGraph::from_contracts(contracts).plan_waves()
    }

    /// Bring up every contract and report the outcome.
    pub async fn start_all(&self, contracts: &[ServiceContract]) -> OrchestrationResult {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.run(run_id, contracts).instrument(span).await
    }

    /// Stop the whole stack.
    pub async fn shutdown(&self, timeout: Duration) -> RuntimeResult<CommandOutput> {
        self.runtime.stop(timeout).await
    }

    async fn run(&self, run_id: String, contracts: &[ServiceContract]) -> OrchestrationResult {
        let started_at = Utc::now();
        let timer = Instant::now();

        let graph = DependencyGraph::from_contracts(contracts);
        let plan = graph.plan_waves();
        if let Some(cycle) = graph.find_cycle() {
            warn!(cycle = %cycle.join(" -> "), "hard dependency cycle; affected services start after the ordered waves");
        }
        let waves = plan.execution_waves();
        let lookup = RunPlan {
            contracts: contracts.iter().map(|c| (c.name.as_str(), c)).collect(),
            remainder: plan.remainder().iter().map(String::as_str).collect(),
        };

        let ctx = OrchestrationContext::new(run_id.clone(), contracts, self.config.global_timeout());
        obs::emit_orchestration_started(&run_id, contracts.len(), waves.len());

        let permits = Semaphore::new(self.config.max_parallelism.max(1));
        for (index, wave) in waves.iter().enumerate() {
            if ctx.deadline_exceeded() {
                ctx.mark_deadline_hit();
                warn!(wave = index, "deadline exceeded; no further waves start");
                break;
            }
            obs::emit_wave_started(&run_id, index, wave);

            let tasks = wave
                .iter()
                .filter_map(|name| lookup.contracts.get(name.as_str()).copied())
                .map(|contract| {
                    let permits = &permits;
                    let ctx = &ctx;
                    let lookup = &lookup;
                    async move {
                        let _permit = permits.acquire().await.ok();
                        self.start_service(ctx, lookup, contract).await;
                    }
                });
            join_all(tasks).await;
        }

        if ctx.deadline_exceeded() {
            let late = ctx.time_out_unstarted(DEADLINE_REASON).await;
            if !late.is_empty() {
                ctx.mark_deadline_hit();
            }
        }

        let snapshot = ctx.snapshot().await;
        let services: Vec<ServiceReport> = contracts
            .iter()
            .filter_map(|c| snapshot.get(&c.name).cloned())
            .map(ServiceReport::from)
            .collect();
        let failed_services: Vec<String> = services
            .iter()
            .filter(|s| s.phase != ServicePhase::Ready)
            .map(|s| s.name.clone())
            .collect();
        let success = services
            .iter()
            .all(|s| !s.role.is_critical() || s.phase == ServicePhase::Ready);
        let duration_ms = timer.elapsed().as_millis() as u64;

        obs::emit_orchestration_finished(&run_id, duration_ms, failed_services.len(), success);

        OrchestrationResult {
            run_id,
            success,
            waves,
            startup_sequence: ctx.ready_order().await,
            cyclic_remainder: plan.remainder().to_vec(),
            services,
            failed_services,
            deadline_exceeded: ctx.deadline_hit(),
            started_at,
            duration_ms,
            recommendations: ctx.recommendations().await,
        }
    }

    async fn start_service(
        &self,
        ctx: &OrchestrationContext,
        lookup: &RunPlan<'_>,
        contract: &ServiceContract,
    ) {
        let name = contract.name.as_str();
        if ctx.deadline_exceeded() {
            ctx.mark_deadline_hit();
            self.finish(ctx, name, ServicePhase::TimedOut, Some(DEADLINE_REASON.to_string()))
                .await;
            return;
        }
        self.set_phase(ctx, name, ServicePhase::Initializing).await;

        let in_remainder = lookup.remainder.contains(name);
        for dep in &contract.dependencies {
            let dep_name = dep.service.as_str();
            match dep.kind {
                DependencyKind::Hard => {
                    let Some(dep_contract) = lookup.contracts.get(dep_name) else {
                        self.finish(
                            ctx,
                            name,
                            ServicePhase::Failed,
                            Some(format!("hard dependency {dep_name} is not declared")),
                        )
                        .await;
                        return;
                    };
                    let dep_settled = ctx
                        .phase(dep_name)
                        .await
                        .is_some_and(|p| p.is_terminal());
                    if in_remainder && lookup.remainder.contains(dep_name) && !dep_settled {
                        ctx.warn(
                            name,
                            format!("hard dependency {dep_name} is on a cycle; starting without it"),
                        )
                        .await;
                        continue;
                    }
                    match self.wait_for_dependency(ctx, dep_contract).await {
                        DependencyWait::Ready => {}
                        DependencyWait::Unsatisfiable(phase) => {
                            self.finish(
                                ctx,
                                name,
                                ServicePhase::Failed,
                                Some(format!("hard dependency {dep_name} is {phase}")),
                            )
                            .await;
                            return;
                        }
                        DependencyWait::TimedOut => {
                            self.finish(
                                ctx,
                                name,
                                ServicePhase::TimedOut,
                                Some(format!("timed out waiting for hard dependency {dep_name}")),
                            )
                            .await;
                            return;
                        }
                        DependencyWait::DeadlineExceeded => {
                            ctx.mark_deadline_hit();
                            self.finish(ctx, name, ServicePhase::TimedOut, Some(DEADLINE_REASON.to_string()))
                                .await;
                            return;
                        }
                    }
                }
                DependencyKind::Soft => match ctx.phase(dep_name).await {
                    Some(ServicePhase::Ready) => {}
                    Some(phase) if phase.is_unsatisfiable() => {
                        ctx.warn(name, format!("soft dependency {dep_name} is {phase}"))
                            .await;
                    }
                    Some(phase) => {
                        debug!(
                            service = %name,
                            dependency = %dep_name,
                            %phase,
                            "soft dependency not ready yet"
                        );
                    }
                    None => {
                        ctx.warn(name, format!("soft dependency {dep_name} is not declared"))
                            .await;
                    }
                },
                DependencyKind::Optional => {
                    debug!(service = %name, dependency = %dep_name, "optional dependency noted");
                }
            }
        }

        let budget = Duration::from_secs(contract.startup_timeout_secs);
        match tokio::time::timeout(budget, self.attempt_loop(ctx, contract)).await {
            Ok(AttemptOutcome::Ready) if ctx.deadline_exceeded() => {
                ctx.mark_deadline_hit();
                self.finish(
                    ctx,
                    name,
                    ServicePhase::TimedOut,
                    Some("became ready after the global deadline".to_string()),
                )
                .await;
            }
            Ok(AttemptOutcome::Ready) => {
                self.set_phase(ctx, name, ServicePhase::Ready).await;
            }
            Ok(AttemptOutcome::Exhausted) if ctx.deadline_exceeded() => {
                ctx.mark_deadline_hit();
                self.finish(ctx, name, ServicePhase::TimedOut, None).await;
            }
            Ok(AttemptOutcome::Exhausted) => {
                self.finish(ctx, name, ServicePhase::Failed, None).await;
            }
            Ok(AttemptOutcome::DeadlineExceeded) => {
                ctx.mark_deadline_hit();
                self.finish(ctx, name, ServicePhase::TimedOut, Some(DEADLINE_REASON.to_string()))
                    .await;
            }
            Err(_) => {
                let report = FailureReport::new(
                    "Timeout",
                    format!("startup of {name} timed out after {}s", budget.as_secs()),
                    format!("start:{name}"),
                )
                .with_context("service", name);
                self.route_failure(ctx, name, &report).await;
                self.finish(ctx, name, ServicePhase::TimedOut, None).await;
            }
        }
    }

    async fn attempt_loop(
        &self,
        ctx: &OrchestrationContext,
        contract: &ServiceContract,
    ) -> AttemptOutcome {
        let name = contract.name.as_str();
        let max_attempts = contract.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if ctx.deadline_exceeded() {
                return AttemptOutcome::DeadlineExceeded;
            }
            ctx.update(name, |s| s.attempts = attempt).await;
            self.set_phase(ctx, name, ServicePhase::Starting).await;

            let started = self
                .runtime
                .start(std::slice::from_ref(&contract.name), &self.start_options)
                .await;
            let report = match started {
                Ok(_) => {
                    self.set_phase(ctx, name, ServicePhase::HealthCheck).await;
                    let health = self.probe.check_service(contract).await;
                    if health.status.is_available() {
                        info!(service = %name, attempt, status = %health.status, "service healthy");
                        return AttemptOutcome::Ready;
                    }
                    FailureReport::new(
                        health
                            .error_type
                            .clone()
                            .unwrap_or_else(|| "HealthCheckFailed".to_string()),
                        format!(
                            "health check failed for {name}: {}",
                            health.error.as_deref().unwrap_or("service unhealthy")
                        ),
                        format!("health:{name}"),
                    )
                    .with_context("service", name)
                }
                Err(e) => FailureReport::from_runtime(&e, format!("start:{name}"))
                    .with_context("service", name),
            };

            warn!(
                service = %name,
                attempt,
                max_attempts,
                error = %report.message,
                "start attempt failed"
            );
            self.route_failure(ctx, name, &report).await;

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }
        AttemptOutcome::Exhausted
    }

    async fn wait_for_dependency(
        &self,
        ctx: &OrchestrationContext,
        dependency: &ServiceContract,
    ) -> DependencyWait {
        let budget = Duration::from_secs(dependency.startup_timeout_secs);
        let started = Instant::now();
        loop {
            match ctx.phase(&dependency.name).await {
                Some(ServicePhase::Ready) => return DependencyWait::Ready,
                Some(phase) if phase.is_unsatisfiable() => {
                    return DependencyWait::Unsatisfiable(phase)
                }
                _ => {}
            }
            if ctx.deadline_exceeded() {
                return DependencyWait::DeadlineExceeded;
            }
            if started.elapsed() >= budget {
                return DependencyWait::TimedOut;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Record the fault on the service and hand it to the advisor.
    async fn route_failure(&self, ctx: &OrchestrationContext, name: &str, report: &FailureReport) {
        let message = report.message.clone();
        ctx.update(name, |s| s.last_error = Some(message)).await;
        match self.advisor.handle_failure(report).await {
            Ok(handled) => {
                let error_id = handled.error.error_id.clone();
                ctx.update(name, |s| s.error_id = Some(error_id)).await;
                ctx.add_recommendations(handled.recommendations).await;
            }
            Err(e) => warn!(service = %name, error = %e, "failed to record deployment error"),
        }
    }

    async fn finish(
        &self,
        ctx: &OrchestrationContext,
        name: &str,
        phase: ServicePhase,
        reason: Option<String>,
    ) {
        if let Some(reason) = reason {
            ctx.update(name, |s| s.last_error = Some(reason)).await;
        }
        self.set_phase(ctx, name, phase).await;
    }

    async fn set_phase(&self, ctx: &OrchestrationContext, name: &str, phase: ServicePhase) {
        if let Err(e) = ctx.transition(name, phase).await {
            warn!(service = %name, error = %e, "phase transition rejected");
        }
    }
}

impl std::fmt::Debug for StartupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupOrchestrator")
            .field("config", &self.config)
            .field("start_options", &self.start_options)
            .finish_non_exhaustive()
    }
}
