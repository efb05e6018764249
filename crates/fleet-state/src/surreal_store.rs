//! SurrealDB-backed ErrorStore implementation
//!
//! Uses `schema::ErrorRow` and `schema::RecoveryRow` for persistence,
//! converting to/from `storage_traits` types at the boundary.
//!
//! Supports any engine reachable through `engine::any`: `mem://` for
//! tests, `surrealkv://<path>` for local persistence, `ws://`/`wss://` for
//! a remote server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::migrations;
use crate::schema::{ErrorRow, RecoveryRow};
use crate::storage_traits::{
    DeploymentError, ErrorFilter, ErrorStore, RecoveryRecord, StorageResult, UpsertOutcome,
};

/// Default on-disk location of the failure log.
pub const DEFAULT_STORE_PATH: &str = ".fleet/db";

/// Connection settings for [`SurrealErrorStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Engine URL, e.g. `mem://` or `surrealkv://.fleet/db`
    pub url: String,
    /// Namespace (default: "fleet")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: format!("surrealkv://{DEFAULT_STORE_PATH}"),
            namespace: "fleet".to_string(),
            database: "main".to_string(),
        }
    }
}

impl StoreConfig {
    /// In-memory configuration for tests.
    pub fn in_memory() -> Self {
        Self {
            url: "mem://".to_string(),
            ..Self::default()
        }
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - FLEET_STORE_URL (optional, default: "surrealkv://.fleet/db")
    /// - FLEET_STORE_NAMESPACE (optional, default: "fleet")
    /// - FLEET_STORE_DATABASE (optional, default: "main")
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("FLEET_STORE_URL").unwrap_or(defaults.url),
            namespace: std::env::var("FLEET_STORE_NAMESPACE").unwrap_or(defaults.namespace),
            database: std::env::var("FLEET_STORE_DATABASE").unwrap_or(defaults.database),
        }
    }
}

/// SurrealDB-backed implementation of [`ErrorStore`].
#[derive(Clone)]
pub struct SurrealErrorStore {
    db: Surreal<Any>,
}

impl SurrealErrorStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    /// Create from environment variables, see [`StoreConfig::from_env`].
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(&StoreConfig::from_env()).await
    }

    /// Connect, select namespace/database and run migrations.
    #[instrument(skip(config), fields(url = %config.url, namespace = %config.namespace))]
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        if let Some(path) = config.url.strip_prefix("surrealkv://") {
            std::fs::create_dir_all(path).map_err(|e| {
                StorageError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(config.url.as_str())
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to connect to {}: {}", config.url, e))
            })?;

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealErrorStore connected ({})", config.url);
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_row(&self, error_id: &str) -> StorageResult<Option<ErrorRow>> {
        let id_owned = error_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM deployment_errors WHERE error_id = $eid")
            .bind(("eid", id_owned))
            .await?;

        let rows: Vec<ErrorRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn replace_row(&self, row: ErrorRow) -> StorageResult<()> {
        let id_owned = row.error_id.clone();
        self.db
            .query("UPDATE deployment_errors CONTENT $row WHERE error_id = $eid")
            .bind(("row", row))
            .bind(("eid", id_owned))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl ErrorStore for SurrealErrorStore {
    async fn upsert_error(&self, error: &DeploymentError) -> StorageResult<UpsertOutcome> {
        match self.fetch_row(&error.error_id).await? {
            Some(existing) => {
                let mut record = existing.into_record()?;
                record.absorb_recurrence(error);
                let occurrences = record.occurrences;
                debug!(error_id = %error.error_id, occurrences, "updating recurring error");
                self.replace_row(ErrorRow::from_record(&record)?).await?;
                Ok(UpsertOutcome::Updated { occurrences })
            }
            None => {
                debug!(error_id = %error.error_id, "inserting error");
                let row = ErrorRow::from_record(error)?;
                let _created: Option<ErrorRow> = self
                    .db
                    .create("deployment_errors")
                    .content(row)
                    .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get_error(&self, error_id: &str) -> StorageResult<Option<DeploymentError>> {
        self.fetch_row(error_id)
            .await?
            .map(ErrorRow::into_record)
            .transpose()
    }

    async fn list_errors(&self, filter: &ErrorFilter) -> StorageResult<Vec<DeploymentError>> {
        let mut conditions: Vec<&str> = Vec::new();
        if filter.unresolved_only {
            conditions.push("resolved = false");
        }
        if filter.category.is_some() {
            conditions.push("category = $category");
        }

        let mut sql = String::from("SELECT * FROM deployment_errors");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = self.db.query(sql);
        if let Some(category) = filter.category {
            query = query.bind(("category", category.as_str().to_string()));
        }

        let mut res = query.await?;
        let rows: Vec<ErrorRow> = res.take(0)?;
        rows.into_iter().map(ErrorRow::into_record).collect()
    }

    async fn mark_resolved(&self, error_id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let mut row = self
            .fetch_row(error_id)
            .await?
            .ok_or_else(|| StorageError::ErrorNotFound {
                error_id: error_id.to_string(),
            })?;
        row.resolved = true;
        row.resolution_time = Some(at);
        self.replace_row(row).await
    }

    async fn record_recovery(&self, record: &RecoveryRecord) -> StorageResult<()> {
        let mut parent =
            self.fetch_row(&record.error_id)
                .await?
                .ok_or_else(|| StorageError::ErrorNotFound {
                    error_id: record.error_id.clone(),
                })?;

        let _created: Option<RecoveryRow> = self
            .db
            .create("recovery_actions")
            .content(RecoveryRow::from(record))
            .await?;

        if !parent.auto_recovery_attempted {
            parent.auto_recovery_attempted = true;
            self.replace_row(parent).await?;
        }
        Ok(())
    }

    async fn recoveries_for(&self, error_id: &str) -> StorageResult<Vec<RecoveryRecord>> {
        let id_owned = error_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM recovery_actions WHERE error_id = $eid ORDER BY executed_at ASC")
            .bind(("eid", id_owned))
            .await?;

        let rows: Vec<RecoveryRow> = res.take(0)?;
        Ok(rows.into_iter().map(RecoveryRecord::from).collect())
    }
}
