//! Fleet-State: persisted failure log for the fleet control plane
//!
//! This crate owns the only durable output of a bring-up run: the log of
//! classified deployment errors and the recovery actions executed against
//! them.
//!
//! ## Key Components
//!
//! - `ErrorStore`: backend-agnostic async trait (upsert, list, resolve, record recovery)
//! - `SurrealErrorStore`: SurrealDB implementation (`mem://`, `surrealkv://`, `ws://`)
//! - `MemoryErrorStore`: in-memory fake for tests
//!
//! Two tables are maintained:
//!
//! - `deployment_errors`, unique on `error_id`
//! - `recovery_actions`, each row referencing a `deployment_errors.error_id`

mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::StorageError;
pub use storage_traits::{
    DeploymentError, ErrorCategory, ErrorFilter, ErrorSeverity, ErrorStore, RecoveryRecord,
    StorageResult, UpsertOutcome,
};
pub use surreal_store::{StoreConfig, SurrealErrorStore};
