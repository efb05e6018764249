//! Recovery advice and bounded auto-remediation.
//!
//! The advisor persists every classified fault, decides whether the fault
//! is eligible for automatic recovery, and if so runs the first executable
//! action from the category's ranked remediation list.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use fleet_state::{
    DeploymentError, ErrorCategory, ErrorFilter, ErrorSeverity, ErrorStore, RecoveryRecord,
    UpsertOutcome,
};

use crate::config::{GatewayConfig, RecoveryConfig};
use crate::domain::error::Result;
use crate::obs;
use crate::recovery::classifier::{classify_failure, FailureReport};
use crate::runtime::command::{render_command, CommandRunner};

/// Kind of remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryActionType {
    RestartService,
    RestartStack,
    PullImages,
    ValidateConfig,
    PruneResources,
    ManualIntervention,
}

impl RecoveryActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryActionType::RestartService => "restart_service",
            RecoveryActionType::RestartStack => "restart_stack",
            RecoveryActionType::PullImages => "pull_images",
            RecoveryActionType::ValidateConfig => "validate_config",
            RecoveryActionType::PruneResources => "prune_resources",
            RecoveryActionType::ManualIntervention => "manual_intervention",
        }
    }
}

/// One proposed remediation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub action_type: RecoveryActionType,
    pub description: String,
    /// argv to run; `None` for advice-only actions.
    pub command: Option<Vec<String>>,
    pub timeout_secs: u64,
    /// Executions tried before the action counts as failed.
    pub retry_attempts: u32,
}

impl RecoveryAction {
    fn advice(description: impl Into<String>) -> Self {
        Self {
            action_type: RecoveryActionType::ManualIntervention,
            description: description.into(),
            command: None,
            timeout_secs: 0,
            retry_attempts: 0,
        }
    }

    pub fn is_executable(&self) -> bool {
        self.command.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Whether a fault may be remediated without an operator.
///
/// Low severity always; Medium only for transient-looking categories;
/// High and Critical never.
pub fn is_auto_recoverable(category: ErrorCategory, severity: ErrorSeverity) -> bool {
    match severity {
        ErrorSeverity::Low => true,
        ErrorSeverity::Medium => matches!(
            category,
            ErrorCategory::Network | ErrorCategory::Configuration | ErrorCategory::Dependency
        ),
        ErrorSeverity::High | ErrorSeverity::Critical => false,
    }
}

/// Ranked remediation actions for `category`, best first.
pub fn remediation_plan(
    category: ErrorCategory,
    service: Option<&str>,
    gateway: &GatewayConfig,
    timeout_secs: u64,
) -> Vec<RecoveryAction> {
    let compose = |args: &[&str]| -> Vec<String> {
        let mut argv = gateway.base_command();
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    };
    let action = |action_type, description: String, command: Vec<String>, retry_attempts| {
        RecoveryAction {
            action_type,
            description,
            command: Some(command),
            timeout_secs,
            retry_attempts,
        }
    };
    let restart = |svc: &str| {
        action(
            RecoveryActionType::RestartService,
            format!("Restart {svc}"),
            compose(&["restart", svc]),
            2,
        )
    };

    let mut plan = Vec::new();
    match category {
        ErrorCategory::Network | ErrorCategory::Service => {
            if let Some(svc) = service {
                plan.push(restart(svc));
            }
            plan.push(RecoveryAction::advice(
                "Check published ports and host reachability",
            ));
        }
        ErrorCategory::Dependency => {
            if let Some(svc) = service {
                plan.push(restart(svc));
            }
            plan.push(action(
                RecoveryActionType::RestartStack,
                "Bring up the full stack in dependency order".to_string(),
                compose(&["up", "-d"]),
                1,
            ));
        }
        ErrorCategory::Configuration => {
            plan.push(action(
                RecoveryActionType::ValidateConfig,
                "Validate the compose configuration".to_string(),
                compose(&["config", "--quiet"]),
                1,
            ));
            plan.push(RecoveryAction::advice("Fix the reported configuration fields"));
        }
        ErrorCategory::Docker => {
            let mut args = vec!["pull"];
            if let Some(svc) = service {
                args.push(svc);
            }
            plan.push(action(
                RecoveryActionType::PullImages,
                "Pull service images".to_string(),
                compose(args.as_slice()),
                1,
            ));
            if let Some(svc) = service {
                plan.push(restart(svc));
            }
        }
        ErrorCategory::Resource => {
            if let Some(runtime) = gateway.binary.first() {
                plan.push(action(
                    RecoveryActionType::PruneResources,
                    "Prune unused containers, networks and images".to_string(),
                    vec![
                        runtime.clone(),
                        "system".to_string(),
                        "prune".to_string(),
                        "-f".to_string(),
                    ],
                    1,
                ));
            }
        }
        ErrorCategory::Permission => {
            plan.push(RecoveryAction::advice(
                "Grant the runtime user access to the container socket",
            ));
        }
        ErrorCategory::Environment => {
            plan.push(RecoveryAction::advice("Set the missing environment variables"));
        }
        ErrorCategory::Unknown => {
            plan.push(RecoveryAction::advice("Inspect logs and retry manually"));
        }
    }
    plan
}

/// What [`RecoveryAdvisor::handle_failure`] did with a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandledFailure {
    pub error: DeploymentError,
    pub outcome: UpsertOutcome,
    pub auto_recoverable: bool,
    pub action: Option<RecoveryAction>,
    pub recovery: Option<RecoveryRecord>,
    /// Operator-facing next steps.
    pub recommendations: Vec<String>,
}

/// Aggregate view over the failure log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub total: usize,
    pub unresolved: usize,
    pub total_occurrences: u64,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
    pub auto_recovery_attempted: usize,
    /// Resolved share in percent (0 when the log is empty).
    pub resolution_rate: f64,
}

/// Classifies, persists and remediates failures.
pub struct RecoveryAdvisor {
    store: Arc<dyn ErrorStore>,
    runner: CommandRunner,
    gateway: GatewayConfig,
    config: RecoveryConfig,
}

impl RecoveryAdvisor {
    pub fn new(
        store: Arc<dyn ErrorStore>,
        runner: CommandRunner,
        gateway: GatewayConfig,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            runner,
            gateway,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ErrorStore> {
        &self.store
    }

    /// Ranked remediation for a recorded fault.
    pub fn plan(&self, error: &DeploymentError) -> Vec<RecoveryAction> {
        let service = error.context.get("service").and_then(|v| v.as_str());
        remediation_plan(
            error.category,
            service,
            &self.gateway,
            self.config.action_timeout_secs,
        )
    }

    /// First executable action for `error`, if any.
    pub fn select_action(&self, error: &DeploymentError) -> Option<RecoveryAction> {
        self.plan(error).into_iter().find(RecoveryAction::is_executable)
    }

    /// Run `action` for `error_id`, persist the execution and resolve the
    /// fault on success.
    #[instrument(skip(self, action), fields(action = action.action_type.as_str()))]
    pub async fn execute(&self, error_id: &str, action: &RecoveryAction) -> Result<RecoveryRecord> {
        let started = Utc::now();
        let timer = std::time::Instant::now();
        let attempts = action.retry_attempts.max(1);
        let timeout = Duration::from_secs(action.timeout_secs.max(1));

        let (success, output, error_message) = match &action.command {
            None => (false, String::new(), Some("action has no command".to_string())),
            Some(argv) => {
                let mut last = (false, String::new(), None);
                for attempt in 1..=attempts {
                    match self.runner.run(argv, timeout).await {
                        Ok(out) if out.passed() => {
                            last = (true, out.stdout, None);
                            break;
                        }
                        Ok(out) => {
                            debug!(attempt, exit_code = out.exit_code, "recovery command failed");
                            last = (
                                false,
                                out.stdout,
                                Some(format!("exit code {}: {}", out.exit_code, out.stderr.trim())),
                            );
                        }
                        Err(e) => {
                            debug!(attempt, error = %e, "recovery command errored");
                            last = (false, String::new(), Some(e.to_string()));
                        }
                    }
                }
                last
            }
        };

        let record = RecoveryRecord {
            error_id: error_id.to_string(),
            action_type: action.action_type.as_str().to_string(),
            description: action.description.clone(),
            command: action.command.as_deref().map(render_command),
            executed_at: started,
            success,
            execution_time_ms: timer.elapsed().as_millis() as u64,
            output,
            error_message,
        };
        self.store.record_recovery(&record).await?;
        if success {
            self.store.mark_resolved(error_id, Utc::now()).await?;
        }
        obs::emit_recovery_executed(
            error_id,
            record.action_type.as_str(),
            success,
            record.execution_time_ms,
        );
        Ok(record)
    }

    /// Classify and persist `report`; run the selected action when the
    /// fault is eligible and auto-recovery is enabled.
    #[instrument(skip(self, report), fields(operation = %report.operation))]
    pub async fn handle_failure(&self, report: &FailureReport) -> Result<HandledFailure> {
        let mut error = classify_failure(report);
        let outcome = self.store.upsert_error(&error).await?;
        if let UpsertOutcome::Updated { occurrences } = outcome {
            error.occurrences = occurrences;
        }
        obs::emit_error_classified(
            &error.error_id,
            error.category.as_str(),
            error.severity.as_str(),
            error.occurrences,
        );

        let auto_recoverable = is_auto_recoverable(error.category, error.severity);
        let action = self.select_action(&error);
        let mut recommendations = error.resolution_steps.clone();
        let mut recovery = None;

        match &action {
            Some(action) if auto_recoverable && self.config.auto_recovery => {
                let record = self.execute(&error.error_id, action).await?;
                error.auto_recovery_attempted = true;
                if record.success {
                    error.resolved = true;
                    error.resolution_time = Some(Utc::now());
                } else {
                    warn!(error_id = %error.error_id, "automatic recovery failed");
                }
                recovery = Some(record);
            }
            Some(action) => {
                recommendations.push(format!(
                    "{} (`{}`)",
                    action.description,
                    action.command.as_deref().map(render_command).unwrap_or_default()
                ));
            }
            None => {}
        }

        Ok(HandledFailure {
            error,
            outcome,
            auto_recoverable,
            action,
            recovery,
            recommendations,
        })
    }

    pub async fn list_errors(&self, filter: &ErrorFilter) -> Result<Vec<DeploymentError>> {
        Ok(self.store.list_errors(filter).await?)
    }

    /// Totals, per-category and per-severity counts, and resolution rate.
    pub async fn statistics(&self) -> Result<ErrorStatistics> {
        let errors = self.store.list_errors(&ErrorFilter::all()).await?;
        let mut stats = ErrorStatistics {
            total: errors.len(),
            ..ErrorStatistics::default()
        };
        for e in &errors {
            if !e.resolved {
                stats.unresolved += 1;
            }
            if e.auto_recovery_attempted {
                stats.auto_recovery_attempted += 1;
            }
            stats.total_occurrences += u64::from(e.occurrences);
            *stats.by_category.entry(e.category).or_default() += 1;
            *stats.by_severity.entry(e.severity).or_default() += 1;
        }
        if stats.total > 0 {
            stats.resolution_rate =
                (stats.total - stats.unresolved) as f64 * 100.0 / stats.total as f64;
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for RecoveryAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryAdvisor")
            .field("gateway", &self.gateway)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
