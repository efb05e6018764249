//! In-memory fake for the failure log (testing only)
//!
//! `MemoryErrorStore` satisfies the `ErrorStore` contract without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory failure log backed by a `HashMap<error_id, DeploymentError>`.
#[derive(Debug, Default)]
pub struct MemoryErrorStore {
    errors: Mutex<HashMap<String, DeploymentError>>,
    recoveries: Mutex<Vec<RecoveryRecord>>,
}

impl MemoryErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn errors(&self) -> StorageResult<MutexGuard<'_, HashMap<String, DeploymentError>>> {
        self.errors
            .lock()
            .map_err(|_| StorageError::Backend("error table lock poisoned".to_string()))
    }

    fn recoveries(&self) -> StorageResult<MutexGuard<'_, Vec<RecoveryRecord>>> {
        self.recoveries
            .lock()
            .map_err(|_| StorageError::Backend("recovery table lock poisoned".to_string()))
    }
}

#[async_trait]
impl ErrorStore for MemoryErrorStore {
    async fn upsert_error(&self, error: &DeploymentError) -> StorageResult<UpsertOutcome> {
        let mut errors = self.errors()?;
        match errors.get_mut(&error.error_id) {
            Some(existing) => {
                existing.absorb_recurrence(error);
                Ok(UpsertOutcome::Updated {
                    occurrences: existing.occurrences,
                })
            }
            None => {
                errors.insert(error.error_id.clone(), error.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get_error(&self, error_id: &str) -> StorageResult<Option<DeploymentError>> {
        Ok(self.errors()?.get(error_id).cloned())
    }

    async fn list_errors(&self, filter: &ErrorFilter) -> StorageResult<Vec<DeploymentError>> {
        let errors = self.errors()?;
        let mut matched: Vec<DeploymentError> = errors
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn mark_resolved(&self, error_id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let mut errors = self.errors()?;
        let record = errors
            .get_mut(error_id)
            .ok_or_else(|| StorageError::ErrorNotFound {
                error_id: error_id.to_string(),
            })?;
        record.resolved = true;
        record.resolution_time = Some(at);
        Ok(())
    }

    async fn record_recovery(&self, record: &RecoveryRecord) -> StorageResult<()> {
        {
            let mut errors = self.errors()?;
            let parent =
                errors
                    .get_mut(&record.error_id)
                    .ok_or_else(|| StorageError::ErrorNotFound {
                        error_id: record.error_id.clone(),
                    })?;
            parent.auto_recovery_attempted = true;
        }
        self.recoveries()?.push(record.clone());
        Ok(())
    }

    async fn recoveries_for(&self, error_id: &str) -> StorageResult<Vec<RecoveryRecord>> {
        let mut matched: Vec<RecoveryRecord> = self
            .recoveries()?
            .iter()
            .filter(|r| r.error_id == error_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.executed_at.cmp(&b.executed_at));
        Ok(matched)
    }
}
