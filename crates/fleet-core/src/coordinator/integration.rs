//! Linear integration run: validate, start, verify, report.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::FleetConfig;
use crate::domain::contract::{DependencyKind, ServiceContract, ServiceRole};
use crate::domain::error::{FleetError, Result, RuntimeResult};
use crate::health::checker::ServiceProbe;
use crate::health::result::{HealthStatus, SystemHealthReport};
use crate::obs;
use crate::orchestrator::graph::DependencyGraph;
use crate::orchestrator::result::OrchestrationResult;
use crate::orchestrator::startup::StartupOrchestrator;
use crate::recovery::advisor::RecoveryAdvisor;
use crate::recovery::classifier::FailureReport;
use crate::runtime::command::CommandOutput;
use crate::runtime::gateway::{ContainerRuntime, StartOptions};

use super::phase::{IntegrationPhase, IntegrationReport, IntegrationResult};

/// Check a contract set before anything is started: non-empty, unique
/// names, at least one start attempt each.
pub fn validate_contracts(contracts: &[ServiceContract]) -> Result<()> {
    if contracts.is_empty() {
        return Err(FleetError::InvalidContract("no services declared".to_string()));
    }
    let mut seen = HashSet::new();
    for c in contracts {
        if c.name.trim().is_empty() {
            return Err(FleetError::InvalidContract("service with empty name".to_string()));
        }
        if !seen.insert(c.name.as_str()) {
            return Err(FleetError::InvalidContract(format!(
                "duplicate service name: {}",
                c.name
            )));
        }
        if c.max_attempts == 0 {
            return Err(FleetError::InvalidContract(format!(
                "{}: max_attempts must be at least 1",
                c.name
            )));
        }
    }
    Ok(())
}

struct PhaseOutcome {
    success: bool,
    message: String,
    diagnostics: Vec<String>,
}

impl PhaseOutcome {
    fn pass(message: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            diagnostics,
        }
    }

    fn fail(message: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            diagnostics,
        }
    }
}

/// Artifacts collected while phases run.
#[derive(Default)]
struct RunArtifacts {
    orchestration: Option<OrchestrationResult>,
    health: Option<SystemHealthReport>,
    recommendations: Vec<String>,
}

impl RunArtifacts {
    fn recommend(&mut self, steps: impl IntoIterator<Item = String>) {
        for step in steps {
            if !self.recommendations.contains(&step) {
                self.recommendations.push(step);
            }
        }
    }
}

/// Drives the integration phases and produces the single externally
/// reported [`IntegrationReport`].
pub struct IntegrationCoordinator {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn ServiceProbe>,
    advisor: Arc<RecoveryAdvisor>,
    orchestrator: StartupOrchestrator,
    config: FleetConfig,
}

impl IntegrationCoordinator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ServiceProbe>,
        advisor: Arc<RecoveryAdvisor>,
        config: FleetConfig,
    ) -> Self {
        let orchestrator = StartupOrchestrator::new(
            Arc::clone(&runtime),
            Arc::clone(&probe),
            Arc::clone(&advisor),
            config.orchestration.clone(),
        );
        Self {
            runtime,
            probe,
            advisor,
            orchestrator,
            config,
        }
    }

    /// Flags passed to every `up` issued during ServiceStartup.
    pub fn with_start_options(mut self, options: StartOptions) -> Self {
        self.orchestrator = self.orchestrator.with_start_options(options);
        self
    }

    pub fn orchestrator(&self) -> &StartupOrchestrator {
        &self.orchestrator
    }

    /// Run every phase in order, halting at the first failure.
    #[instrument(skip_all, fields(services = contracts.len()))]
    pub async fn run(&self, contracts: &[ServiceContract]) -> IntegrationReport {
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut artifacts = RunArtifacts::default();
        let mut results = Vec::new();
        let mut current = IntegrationPhase::Initialization;

        while !current.is_terminal() {
            let phase_timer = Instant::now();
            let outcome = self.run_phase(current, contracts, &mut artifacts).await;
            let duration_ms = phase_timer.elapsed().as_millis() as u64;
            obs::emit_integration_phase(current.as_str(), outcome.success, duration_ms);

            let success = outcome.success;
            if !success {
                self.record_phase_failure(current, &outcome, &mut artifacts)
                    .await;
            }
            results.push(IntegrationResult {
                phase: current,
                success,
                message: outcome.message,
                diagnostics: outcome.diagnostics,
                duration_ms,
                timestamp: Utc::now(),
            });

            current = if success {
                current.next()
            } else {
                IntegrationPhase::Failed
            };
        }

        let success = current == IntegrationPhase::Completed;
        if success {
            info!("integration completed");
        } else {
            warn!(phases_run = results.len(), "integration failed");
        }

        IntegrationReport {
            phase: current,
            success,
            results,
            orchestration: artifacts.orchestration,
            health: artifacts.health,
            recommendations: artifacts.recommendations,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
        }
    }

    /// Stop the stack.
    pub async fn teardown(&self) -> RuntimeResult<CommandOutput> {
        let timeout = Duration::from_secs(self.config.gateway.stop_timeout_secs);
        self.orchestrator.shutdown(timeout).await
    }

    async fn run_phase(
        &self,
        phase: IntegrationPhase,
        contracts: &[ServiceContract],
        artifacts: &mut RunArtifacts,
    ) -> PhaseOutcome {
        match phase {
            IntegrationPhase::Initialization => self.initialization(contracts).await,
            IntegrationPhase::DependencyCheck => dependency_check(contracts),
            IntegrationPhase::ServiceStartup => self.service_startup(contracts, artifacts).await,
            IntegrationPhase::HealthValidation => {
                self.health_validation(contracts, artifacts).await
            }
            IntegrationPhase::IntegrationTesting => self.integration_testing(contracts).await,
            IntegrationPhase::MonitoringSetup => monitoring_setup(contracts, artifacts),
            IntegrationPhase::Completed | IntegrationPhase::Failed => {
                PhaseOutcome::pass("nothing to do", Vec::new())
            }
        }
    }

    async fn initialization(&self, contracts: &[ServiceContract]) -> PhaseOutcome {
        if let Err(e) = validate_contracts(contracts) {
            return PhaseOutcome::fail(e.to_string(), Vec::new());
        }
        match self.runtime.version().await {
            Ok(version) => PhaseOutcome::pass(
                format!("{} services declared", contracts.len()),
                vec![format!("runtime: {version}")],
            ),
            Err(e) => PhaseOutcome::fail(
                format!("container runtime unavailable: {e}"),
                vec![format!("binary: {}", self.config.gateway.binary.join(" "))],
            ),
        }
    }

    async fn service_startup(
        &self,
        contracts: &[ServiceContract],
        artifacts: &mut RunArtifacts,
    ) -> PhaseOutcome {
        let result = self.orchestrator.start_all(contracts).await;
        artifacts.recommend(result.recommendations.iter().cloned());

        let mut diagnostics = Vec::new();
        for s in &result.services {
            if result.failed_services.contains(&s.name) {
                diagnostics.push(format!(
                    "{} ({}) ended {} after {} attempts: {}",
                    s.name,
                    s.role,
                    s.phase,
                    s.attempts,
                    s.last_error.as_deref().unwrap_or("no error recorded")
                ));
            }
            for w in &s.warnings {
                diagnostics.push(format!("warning: {}: {w}", s.name));
            }
        }

        let outcome = if result.success {
            PhaseOutcome::pass(
                format!(
                    "{} of {} services ready",
                    result.startup_sequence.len(),
                    result.services.len()
                ),
                diagnostics,
            )
        } else {
            let critical: Vec<&str> = result
                .critical_failures()
                .iter()
                .map(|s| s.name.as_str())
                .collect();
            PhaseOutcome::fail(
                format!("critical services failed to start: {}", critical.join(", ")),
                diagnostics,
            )
        };
        artifacts.orchestration = Some(result);
        outcome
    }

    async fn health_validation(
        &self,
        contracts: &[ServiceContract],
        artifacts: &mut RunArtifacts,
    ) -> PhaseOutcome {
        let report = self.probe.check_all_services(contracts).await;
        let threshold = self.config.health.pass_threshold;
        let diagnostics = report
            .services
            .iter()
            .filter(|s| s.status != HealthStatus::Healthy)
            .map(|s| {
                format!(
                    "{}: {} (score {:.1}){}",
                    s.name,
                    s.status,
                    s.score,
                    s.error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
                )
            })
            .collect();
        let score = report.score;
        let status = report.status;
        artifacts.health = Some(report);

        if score >= threshold {
            PhaseOutcome::pass(
                format!("system {status}, score {score:.1}"),
                diagnostics,
            )
        } else {
            PhaseOutcome::fail(
                format!("system health score {score:.1} below threshold {threshold:.1}"),
                diagnostics,
            )
        }
    }

    /// Probe the provider of every declared consumer → provider pair once.
    async fn integration_testing(&self, contracts: &[ServiceContract]) -> PhaseOutcome {
        let pairs: Vec<(&ServiceContract, &ServiceContract, DependencyKind)> = contracts
            .iter()
            .flat_map(|consumer| {
                consumer.dependencies.iter().filter_map(move |dep| {
                    contracts
                        .iter()
                        .find(|c| c.name == dep.service)
                        .map(|provider| (consumer, provider, dep.kind))
                })
            })
            .collect();
        if pairs.is_empty() {
            return PhaseOutcome::pass("no integration pairs declared", Vec::new());
        }

        let probes = pairs
            .iter()
            .map(|(_, provider, _)| self.probe.probe_once(&provider.health_check));
        let outcomes = join_all(probes).await;

        let mut diagnostics = Vec::new();
        let mut broken = 0usize;
        for ((consumer, provider, kind), outcome) in pairs.iter().zip(outcomes) {
            if let Err(e) = outcome {
                if *kind == DependencyKind::Hard {
                    broken += 1;
                    diagnostics.push(format!(
                        "{} -> {} unreachable: {e}",
                        consumer.name, provider.name
                    ));
                } else {
                    diagnostics.push(format!(
                        "warning: {} -> {} unreachable: {e}",
                        consumer.name, provider.name
                    ));
                }
            }
        }

        if broken == 0 {
            PhaseOutcome::pass(format!("{} pairs reachable", pairs.len()), diagnostics)
        } else {
            PhaseOutcome::fail(
                format!("{broken} of {} hard pairs unreachable", hard_pair_count(&pairs)),
                diagnostics,
            )
        }
    }

    /// Classify a failed phase and merge its remediation into the report.
    async fn record_phase_failure(
        &self,
        phase: IntegrationPhase,
        outcome: &PhaseOutcome,
        artifacts: &mut RunArtifacts,
    ) {
        let report = FailureReport::new(
            "IntegrationPhaseFailed",
            outcome.message.clone(),
            format!("integration:{phase}"),
        )
        .with_context("phase", phase.as_str())
        .with_context("diagnostics", outcome.diagnostics.clone());
        match self.advisor.handle_failure(&report).await {
            Ok(handled) => artifacts.recommend(handled.recommendations),
            Err(e) => warn!(phase = %phase, error = %e, "failed to record phase failure"),
        }
    }
}

fn hard_pair_count(pairs: &[(&ServiceContract, &ServiceContract, DependencyKind)]) -> usize {
    pairs
        .iter()
        .filter(|(_, _, kind)| *kind == DependencyKind::Hard)
        .count()
}

/// Every dependency resolves and every required capability is provided.
fn dependency_check(contracts: &[ServiceContract]) -> PhaseOutcome {
    let names: HashSet<&str> = contracts.iter().map(|c| c.name.as_str()).collect();
    let provided: HashSet<&str> = contracts
        .iter()
        .flat_map(|c| c.provides.iter().map(String::as_str))
        .collect();

    let mut errors = Vec::new();
    let mut diagnostics = Vec::new();
    for c in contracts {
        for dep in &c.dependencies {
            if names.contains(dep.service.as_str()) {
                continue;
            }
            if dep.kind == DependencyKind::Optional {
                diagnostics.push(format!(
                    "warning: {}: optional dependency {} is not declared",
                    c.name, dep.service
                ));
            } else {
                errors.push(format!(
                    "{}: {:?} dependency {} is not declared",
                    c.name, dep.kind, dep.service
                ));
            }
        }
        for capability in &c.requires {
            if !provided.contains(capability.as_str()) {
                errors.push(format!(
                    "{}: required capability {capability} is not provided",
                    c.name
                ));
            }
        }
    }

    if let Some(cycle) = DependencyGraph::from_contracts(contracts).find_cycle() {
        diagnostics.push(format!(
            "warning: hard dependency cycle {}",
            cycle.join(" -> ")
        ));
    }

    if errors.is_empty() {
        PhaseOutcome::pass("all dependencies resolve", diagnostics)
    } else {
        let message = format!("{} unresolved dependencies", errors.len());
        errors.extend(diagnostics);
        PhaseOutcome::fail(message, errors)
    }
}

/// At least one Monitoring service is Ready, or none are declared.
fn monitoring_setup(contracts: &[ServiceContract], artifacts: &RunArtifacts) -> PhaseOutcome {
    let monitors: Vec<&str> = contracts
        .iter()
        .filter(|c| c.role == ServiceRole::Monitoring)
        .map(|c| c.name.as_str())
        .collect();
    if monitors.is_empty() {
        return PhaseOutcome::pass("no monitoring services declared", Vec::new());
    }

    let (ready, down): (Vec<&str>, Vec<&str>) = monitors.into_iter().partition(|name| {
        artifacts
            .orchestration
            .as_ref()
            .is_some_and(|r| r.is_ready(name))
    });
    let diagnostics = down
        .iter()
        .map(|name| format!("warning: monitoring service {name} is not ready"))
        .collect();

    if ready.is_empty() {
        PhaseOutcome::fail("no monitoring service is ready", diagnostics)
    } else {
        PhaseOutcome::pass(
            format!("monitoring active: {}", ready.join(", ")),
            diagnostics,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::HealthCheckConfig;
    use crate::domain::fleet::default_fleet;

    fn svc(name: &str, role: ServiceRole) -> ServiceContract {
        ServiceContract::new(name, role, HealthCheckConfig::command("true"))
    }

    #[test]
    fn test_validate_contracts_rejects_bad_sets() {
        assert!(validate_contracts(&[]).is_err());
        let dup = vec![svc("a", ServiceRole::Primary), svc("a", ServiceRole::Support)];
        assert!(matches!(
            validate_contracts(&dup),
            Err(FleetError::InvalidContract(msg)) if msg.contains("duplicate")
        ));
        let zero = vec![svc("a", ServiceRole::Primary).with_max_attempts(0)];
        assert!(validate_contracts(&zero).is_err());
        assert!(validate_contracts(&default_fleet()).is_ok());
    }

    #[test]
    fn test_dependency_check_passes_default_fleet() {
        let outcome = dependency_check(&default_fleet());
        assert!(outcome.success, "{:?}", outcome.diagnostics);
    }

    #[test]
    fn test_dependency_check_flags_missing_capability_and_name() {
        let contracts = vec![
            svc("api", ServiceRole::Primary)
                .depends_on("db", DependencyKind::Hard)
                .requires("queue"),
            svc("web", ServiceRole::Support).depends_on("cdn", DependencyKind::Optional),
        ];
        let outcome = dependency_check(&contracts);
        assert!(!outcome.success);
        assert_eq!(outcome.message, "2 unresolved dependencies");
        assert!(outcome.diagnostics.iter().any(|d| d.contains("queue")));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.starts_with("warning:") && d.contains("cdn")));
    }

    #[test]
    fn test_dependency_check_reports_cycle_as_warning() {
        let contracts = vec![
            svc("x", ServiceRole::Support).depends_on("y", DependencyKind::Hard),
            svc("y", ServiceRole::Support).depends_on("x", DependencyKind::Hard),
        ];
        let outcome = dependency_check(&contracts);
        assert!(outcome.success);
        assert!(outcome.diagnostics[0].contains("cycle"));
    }

    #[test]
    fn test_monitoring_setup_without_monitors_passes() {
        let contracts = vec![svc("api", ServiceRole::Primary)];
        let outcome = monitoring_setup(&contracts, &RunArtifacts::default());
        assert!(outcome.success);
    }

    #[test]
    fn test_monitoring_setup_requires_a_ready_monitor() {
        let contracts = vec![svc("prometheus", ServiceRole::Monitoring)];
        let outcome = monitoring_setup(&contracts, &RunArtifacts::default());
        assert!(!outcome.success);
    }
}
