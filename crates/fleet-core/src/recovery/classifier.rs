//! Failure classification.
//!
//! Faults are matched against an ordered keyword table; the first rule
//! whose keyword appears (at a word start) in the lowercased message or
//! error type wins. Context hints are the fallback, then Unknown/Medium.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use fleet_state::{DeploymentError, ErrorCategory, ErrorSeverity};

use crate::domain::error::RuntimeError;

/// Characters of the message that participate in the error id.
pub const MESSAGE_ID_PREFIX_CHARS: usize = 100;

/// A raw fault, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Type name of the fault, e.g. `Timeout` or `CommandFailed`.
    pub error_type: String,
    pub message: String,
    /// Operation that failed, e.g. `start:redis`.
    pub operation: String,
    /// Free-form hints; some keys (`docker_command`, `config_file`,
    /// `env_var`, `service`) steer the fallback classification.
    pub context: serde_json::Value,
}

impl FailureReport {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            operation: operation.into(),
            context: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn from_runtime(err: &RuntimeError, operation: impl Into<String>) -> Self {
        let report = Self::new(err.kind(), err.to_string(), operation);
        match err {
            RuntimeError::CommandFailed { command, .. } => {
                report.with_context("docker_command", command.clone())
            }
            _ => report,
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(map) = &mut self.context {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    fn has_hint(&self, key: &str) -> bool {
        self.context.get(key).is_some_and(|v| !v.is_null())
    }
}

struct ClassificationRule {
    keywords: &'static [&'static str],
    category: ErrorCategory,
    severity: ErrorSeverity,
}

const RULES: &[ClassificationRule] = &[
    ClassificationRule {
        keywords: &["docker", "container", "compose", "image"],
        category: ErrorCategory::Docker,
        severity: ErrorSeverity::High,
    },
    ClassificationRule {
        keywords: &["connection", "timeout", "timed out", "port", "refused", "unreachable"],
        category: ErrorCategory::Network,
        severity: ErrorSeverity::Medium,
    },
    ClassificationRule {
        keywords: &["permission", "denied", "forbidden"],
        category: ErrorCategory::Permission,
        severity: ErrorSeverity::High,
    },
    ClassificationRule {
        keywords: &["memory", "disk", "space", "oom"],
        category: ErrorCategory::Resource,
        severity: ErrorSeverity::High,
    },
    ClassificationRule {
        keywords: &["dependency", "import", "module"],
        category: ErrorCategory::Dependency,
        severity: ErrorSeverity::Medium,
    },
    ClassificationRule {
        keywords: &["config", "yaml", "invalid", "missing field"],
        category: ErrorCategory::Configuration,
        severity: ErrorSeverity::Medium,
    },
    ClassificationRule {
        keywords: &["environment", "env var", "not set"],
        category: ErrorCategory::Environment,
        severity: ErrorSeverity::Medium,
    },
    ClassificationRule {
        keywords: &["health", "unhealthy", "not ready"],
        category: ErrorCategory::Service,
        severity: ErrorSeverity::Medium,
    },
];

const CONTEXT_HINTS: &[(&str, ErrorCategory, ErrorSeverity)] = &[
    ("docker_command", ErrorCategory::Docker, ErrorSeverity::High),
    ("config_file", ErrorCategory::Configuration, ErrorSeverity::Medium),
    ("env_var", ErrorCategory::Environment, ErrorSeverity::Medium),
    ("service", ErrorCategory::Service, ErrorSeverity::Medium),
];

/// `keyword` occurs in `haystack` starting at a word boundary.
///
/// Keeps "port" from matching "import" or "support" while still letting
/// "connection" match "connectionerror".
fn contains_word_start(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Category and severity of a fault.
pub fn classify(report: &FailureReport) -> (ErrorCategory, ErrorSeverity) {
    let haystack = format!(
        "{} {}",
        report.message.to_lowercase(),
        report.error_type.to_lowercase()
    );

    for rule in RULES {
        if rule
            .keywords
            .iter()
            .any(|kw| contains_word_start(&haystack, kw))
        {
            return (rule.category, rule.severity);
        }
    }

    for (key, category, severity) in CONTEXT_HINTS {
        if report.has_hint(key) {
            return (*category, *severity);
        }
    }

    (ErrorCategory::Unknown, ErrorSeverity::Medium)
}

/// Deterministic id of a fault: hex SHA-256 over the error type, the first
/// [`MESSAGE_ID_PREFIX_CHARS`] characters of the message and the operation.
pub fn derive_error_id(error_type: &str, message: &str, operation: &str) -> String {
    let prefix: String = message.chars().take(MESSAGE_ID_PREFIX_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(error_type.as_bytes());
    hasher.update(b":");
    hasher.update(prefix.as_bytes());
    hasher.update(b":");
    hasher.update(operation.as_bytes());
    hex::encode(hasher.finalize())
}

/// Operator-facing remediation steps for a category.
pub fn resolution_steps(category: ErrorCategory) -> Vec<String> {
    let steps: &[&str] = match category {
        ErrorCategory::Docker => &[
            "Check that the Docker daemon is running (`docker info`)",
            "Inspect container logs for the failing service",
            "Pull or rebuild the service image",
        ],
        ErrorCategory::Network => &[
            "Verify the service port is published and not in use",
            "Check that the target host is reachable",
            "Restart the affected service",
        ],
        ErrorCategory::Permission => &[
            "Check file and socket permissions for the runtime user",
            "Ensure the user is in the docker group",
        ],
        ErrorCategory::Resource => &[
            "Free disk space (`docker system prune`)",
            "Raise memory limits or stop unused containers",
        ],
        ErrorCategory::Dependency => &[
            "Verify dependent services are running and healthy",
            "Restart the dependency chain in order",
        ],
        ErrorCategory::Configuration => &[
            "Validate the compose file (`docker compose config`)",
            "Check required fields and values in service configuration",
        ],
        ErrorCategory::Environment => &[
            "Check that required environment variables are set",
            "Verify the .env file is present and readable",
        ],
        ErrorCategory::Service => &[
            "Inspect the service health endpoint and logs",
            "Restart the service",
        ],
        ErrorCategory::Unknown => &["Inspect logs for the failing operation"],
    };
    steps.iter().map(|s| s.to_string()).collect()
}

fn title_case(category: ErrorCategory) -> String {
    let s = category.as_str();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Classify `report` into a fresh [`DeploymentError`] (one occurrence,
/// unresolved).
pub fn classify_failure(report: &FailureReport) -> DeploymentError {
    let (category, severity) = classify(report);
    DeploymentError {
        error_id: derive_error_id(&report.error_type, &report.message, &report.operation),
        timestamp: Utc::now(),
        category,
        severity,
        title: format!("{} error in {}", title_case(category), report.operation),
        message: report.message.clone(),
        operation: report.operation.clone(),
        context: report.context.clone(),
        resolution_steps: resolution_steps(category),
        auto_recovery_attempted: false,
        resolved: false,
        resolution_time: None,
        occurrences: 1,
    }
}
