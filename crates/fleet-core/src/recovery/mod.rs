//! Failure classification and remediation.

pub mod advisor;
pub mod classifier;

pub use advisor::{
    is_auto_recoverable, remediation_plan, ErrorStatistics, HandledFailure, RecoveryAction,
    RecoveryActionType, RecoveryAdvisor,
};
pub use classifier::{classify, classify_failure, derive_error_id, resolution_steps, FailureReport};
