//! SurrealDB schema migrations and initialization
//!
//! Sets up the two failure-log tables with their indexes. Every statement
//! uses `IF NOT EXISTS`, so initialization is safe to repeat on an existing
//! database.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize all failure-log tables.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing fleet failure-log schema");

    init_deployment_errors_table(db).await?;
    init_recovery_actions_table(db).await?;

    info!("Fleet failure-log schema initialization complete");
    Ok(())
}

/// Initialize `deployment_errors`
///
/// Schema:
/// ```text
/// TABLE deployment_errors {
///   error_id:                STRING (unique)
///   timestamp:               DATETIME (indexed)
///   category:                STRING (indexed)
///   severity:                STRING
///   title:                   STRING
///   message:                 STRING
///   operation:               STRING
///   context_json:            STRING
///   resolution_steps_json:   STRING
///   auto_recovery_attempted: BOOL
///   resolved:                BOOL (indexed)
///   resolution_time:         DATETIME?
///   occurrences:             INT
/// }
/// ```
///
/// Rows are never deleted; `resolved` only flips through `mark_resolved`.
async fn init_deployment_errors_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing deployment_errors table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS deployment_errors
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_error_id ON TABLE deployment_errors COLUMNS error_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_error_category ON TABLE deployment_errors COLUMNS category;
        DEFINE INDEX IF NOT EXISTS idx_error_resolved ON TABLE deployment_errors COLUMNS resolved;
        DEFINE INDEX IF NOT EXISTS idx_error_timestamp ON TABLE deployment_errors COLUMNS timestamp;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    info!("✓ deployment_errors table initialized");
    Ok(())
}

/// Initialize `recovery_actions`
///
/// Schema:
/// ```text
/// TABLE recovery_actions {
///   error_id:          STRING (references deployment_errors.error_id, indexed)
///   action_type:       STRING
///   description:       STRING
///   command:           STRING?
///   executed_at:       DATETIME (indexed)
///   success:           BOOL
///   execution_time_ms: INT
///   output:            STRING
///   error_message:     STRING?
/// }
/// ```
///
/// The reference to `deployment_errors` is enforced by the store before insert.
async fn init_recovery_actions_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing recovery_actions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS recovery_actions
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_recovery_error_id ON TABLE recovery_actions COLUMNS error_id;
        DEFINE INDEX IF NOT EXISTS idx_recovery_executed_at ON TABLE recovery_actions COLUMNS executed_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    info!("✓ recovery_actions table initialized");
    Ok(())
}
