//! Error types for fleet-state

use thiserror::Error;

/// Errors that can occur in the failure-log persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Query or backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Referenced deployment error does not exist
    #[error("Deployment error not found: {error_id}")]
    ErrorNotFound { error_id: String },

    /// A persisted row could not be mapped back into a domain record
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found_displays_id() {
        let err = StorageError::ErrorNotFound {
            error_id: "abc123".to_string(),
        };
        assert!(err.to_string().contains("abc123"));
    }
}
