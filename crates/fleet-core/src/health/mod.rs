//! Health checking: probe executors, scoring and per-service history.

pub mod checker;
pub mod probes;
pub mod result;
pub mod score;

pub use checker::{HealthChecker, ServiceProbe};
pub use probes::ProbeExecutor;
pub use result::{
    HealthCheckResult, HealthStatus, HealthTrend, ProbeOutcome, ServiceHealthSummary,
    SystemHealthReport,
};
pub use score::{health_score, system_status};
