//! Row shapes for the SurrealDB tables
//!
//! Timestamps are stored as native SurrealDB datetimes so that `ORDER BY`
//! works on them; `context` and `resolution_steps` are stored as JSON text in
//! `context_json` / `resolution_steps_json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{DeploymentError, RecoveryRecord, StorageResult};

/// Serialize chrono DateTime as a SurrealDB datetime
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Optional variant of [`surreal_datetime`]
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serde::Serialize::serialize(&Some(SurrealDatetime::from(*d)), serializer),
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// Row in `deployment_errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ErrorRow {
    pub error_id: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub operation: String,
    pub context_json: String,
    pub resolution_steps_json: String,
    pub auto_recovery_attempted: bool,
    pub resolved: bool,
    #[serde(default, with = "surreal_datetime_opt")]
    pub resolution_time: Option<DateTime<Utc>>,
    #[serde(default = "default_occurrences")]
    pub occurrences: u32,
}

fn default_occurrences() -> u32 {
    1
}

impl ErrorRow {
    pub fn from_record(record: &DeploymentError) -> StorageResult<Self> {
        Ok(Self {
            error_id: record.error_id.clone(),
            timestamp: record.timestamp,
            category: record.category.as_str().to_string(),
            severity: record.severity.as_str().to_string(),
            title: record.title.clone(),
            message: record.message.clone(),
            operation: record.operation.clone(),
            context_json: serde_json::to_string(&record.context)?,
            resolution_steps_json: serde_json::to_string(&record.resolution_steps)?,
            auto_recovery_attempted: record.auto_recovery_attempted,
            resolved: record.resolved,
            resolution_time: record.resolution_time,
            occurrences: record.occurrences,
        })
    }

    pub fn into_record(self) -> StorageResult<DeploymentError> {
        let context = serde_json::from_str(&self.context_json).map_err(|e| {
            StorageError::InvalidRecord(format!("context_json for {}: {e}", self.error_id))
        })?;
        let resolution_steps = serde_json::from_str(&self.resolution_steps_json).map_err(|e| {
            StorageError::InvalidRecord(format!("resolution_steps_json for {}: {e}", self.error_id))
        })?;

        Ok(DeploymentError {
            category: self.category.parse()?,
            severity: self.severity.parse()?,
            error_id: self.error_id,
            timestamp: self.timestamp,
            title: self.title,
            message: self.message,
            operation: self.operation,
            context,
            resolution_steps,
            auto_recovery_attempted: self.auto_recovery_attempted,
            resolved: self.resolved,
            resolution_time: self.resolution_time,
            occurrences: self.occurrences,
        })
    }
}

/// Row in `recovery_actions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RecoveryRow {
    pub error_id: String,
    pub action_type: String,
    pub description: String,
    pub command: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub execution_time_ms: u64,
    pub output: String,
    pub error_message: Option<String>,
}

impl From<&RecoveryRecord> for RecoveryRow {
    fn from(record: &RecoveryRecord) -> Self {
        Self {
            error_id: record.error_id.clone(),
            action_type: record.action_type.clone(),
            description: record.description.clone(),
            command: record.command.clone(),
            executed_at: record.executed_at,
            success: record.success,
            execution_time_ms: record.execution_time_ms,
            output: record.output.clone(),
            error_message: record.error_message.clone(),
        }
    }
}

impl From<RecoveryRow> for RecoveryRecord {
    fn from(row: RecoveryRow) -> Self {
        Self {
            error_id: row.error_id,
            action_type: row.action_type,
            description: row.description,
            command: row.command,
            executed_at: row.executed_at,
            success: row.success,
            execution_time_ms: row.execution_time_ms,
            output: row.output,
            error_message: row.error_message,
        }
    }
}
