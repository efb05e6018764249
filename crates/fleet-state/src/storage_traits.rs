//! Storage trait and record definitions for the failure log
//!
//! - `DeploymentError`: one classified fault, deduplicated by `error_id`
//! - `RecoveryRecord`: one executed remediation attempt against an error
//! - `ErrorStore`: async, backend-agnostic persistence contract
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Environment,
    Docker,
    Network,
    Configuration,
    Permission,
    Resource,
    Service,
    Dependency,
    Unknown,
}

impl ErrorCategory {
    /// All categories, in taxonomy order.
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::Environment,
        ErrorCategory::Docker,
        ErrorCategory::Network,
        ErrorCategory::Configuration,
        ErrorCategory::Permission,
        ErrorCategory::Resource,
        ErrorCategory::Service,
        ErrorCategory::Dependency,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Environment => "environment",
            ErrorCategory::Docker => "docker",
            ErrorCategory::Network => "network",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Service => "service",
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StorageError::InvalidRecord(format!("unknown error category: {s}")))
    }
}

/// Failure severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub const ALL: [ErrorSeverity; 4] = [
        ErrorSeverity::Low,
        ErrorSeverity::Medium,
        ErrorSeverity::High,
        ErrorSeverity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorSeverity {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorSeverity::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StorageError::InvalidRecord(format!("unknown error severity: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A classified deployment failure.
///
/// `error_id` is derived from the fault's type, message prefix and
/// originating operation, so the same fault recurring maps onto the same
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentError {
    pub error_id: String,
    /// Last time this fault was observed.
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub title: String,
    pub message: String,
    /// Operation that raised the fault, e.g. `start:redis`.
    pub operation: String,
    pub context: serde_json::Value,
    pub resolution_steps: Vec<String>,
    pub auto_recovery_attempted: bool,
    pub resolved: bool,
    pub resolution_time: Option<DateTime<Utc>>,
    /// How many times this fault has been logged.
    pub occurrences: u32,
}

impl DeploymentError {
    /// Fold a recurrence of the same fault into this record.
    ///
    /// The latest observation wins for descriptive fields; a recurrence
    /// always reopens the record.
    pub fn absorb_recurrence(&mut self, newer: &DeploymentError) {
        self.timestamp = newer.timestamp;
        self.category = newer.category;
        self.severity = newer.severity;
        self.title = newer.title.clone();
        self.message = newer.message.clone();
        self.context = newer.context.clone();
        self.resolution_steps = newer.resolution_steps.clone();
        self.auto_recovery_attempted |= newer.auto_recovery_attempted;
        self.resolved = false;
        self.resolution_time = None;
        self.occurrences = self.occurrences.saturating_add(1);
    }
}

/// Execution record of one recovery action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    /// The `DeploymentError` this action was executed for.
    pub error_id: String,
    pub action_type: String,
    pub description: String,
    /// Rendered command line, if the action ran one.
    pub command: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub execution_time_ms: u64,
    pub output: String,
    pub error_message: Option<String>,
}

/// Result of [`ErrorStore::upsert_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated { occurrences: u32 },
}

/// Listing filter for [`ErrorStore::list_errors`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFilter {
    pub unresolved_only: bool,
    pub category: Option<ErrorCategory>,
    pub limit: Option<usize>,
}

impl ErrorFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn unresolved() -> Self {
        Self {
            unresolved_only: true,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `error` passes this filter (limit excluded).
    pub fn matches(&self, error: &DeploymentError) -> bool {
        if self.unresolved_only && error.resolved {
            return false;
        }
        match self.category {
            Some(category) => error.category == category,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorStore
// ---------------------------------------------------------------------------

/// Append-mostly failure log.
///
/// Guarantees:
/// - `upsert_error` with an existing `error_id` updates that record instead
///   of inserting a second one.
/// - `record_recovery` requires the referenced error to exist and marks it
///   as having had auto-recovery attempted.
/// - `mark_resolved` is the only way a record becomes resolved.
#[async_trait]
pub trait ErrorStore: Send + Sync {
    /// Insert a new error or fold a recurrence into the existing record.
    async fn upsert_error(&self, error: &DeploymentError) -> StorageResult<UpsertOutcome>;

    /// Fetch an error by id.
    async fn get_error(&self, error_id: &str) -> StorageResult<Option<DeploymentError>>;

    /// List errors newest first.
    async fn list_errors(&self, filter: &ErrorFilter) -> StorageResult<Vec<DeploymentError>>;

    /// Flip `resolved` to true. Returns `StorageError::ErrorNotFound` if absent.
    async fn mark_resolved(&self, error_id: &str, at: DateTime<Utc>) -> StorageResult<()>;

    /// Persist a recovery execution.
    async fn record_recovery(&self, record: &RecoveryRecord) -> StorageResult<()>;

    /// Recovery executions for an error, oldest first.
    async fn recoveries_for(&self, error_id: &str) -> StorageResult<Vec<RecoveryRecord>>;
}
