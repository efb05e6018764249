//! Fleet Core Library
//!
//! Control plane for a single-host Compose stack: dependency-ordered
//! startup, health validation and failure remediation.

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod health;
pub mod obs;
pub mod orchestrator;
pub mod recovery;
pub mod runtime;
pub mod telemetry;

pub use config::{FleetConfig, GatewayConfig, HealthConfig, OrchestrationConfig, RecoveryConfig};

pub use coordinator::{
    validate_contracts, IntegrationCoordinator, IntegrationPhase, IntegrationReport,
    IntegrationResult,
};

pub use domain::{
    default_fleet, DependencyKind, DependencySpec, FleetError, HealthCheckConfig,
    HealthCheckKind, Result, RuntimeError, RuntimeResult, ServiceContract, ServicePhase,
    ServiceRole, ServiceRuntimeState,
};

pub use health::{
    health_score, system_status, HealthCheckResult, HealthChecker, HealthStatus, HealthTrend,
    ProbeExecutor, ProbeOutcome, ServiceHealthSummary, ServiceProbe, SystemHealthReport,
};

pub use orchestrator::{
    DependencyGraph, OrchestrationContext, OrchestrationResult, ServiceReport,
    StartupOrchestrator, WavePlan,
};

pub use recovery::{
    classify, classify_failure, derive_error_id, is_auto_recoverable, remediation_plan,
    resolution_steps, ErrorStatistics, FailureReport, HandledFailure, RecoveryAction,
    RecoveryActionType, RecoveryAdvisor,
};

pub use runtime::{
    CommandOutput, CommandRunner, ComposeGateway, ContainerRuntime, ContainerStats, LogStream,
    RuntimeHealth, ServiceRuntimeStatus, StartOptions,
};

pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
