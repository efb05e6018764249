//! Trait contract tests for ErrorStore.
//!
//! Every test runs against both the in-memory fake and the SurrealDB
//! implementation (in-memory engine). Any conforming implementation must pass.

use chrono::{Duration, Utc};
use fleet_state::fakes::MemoryErrorStore;
use fleet_state::storage_traits::*;
use fleet_state::{StorageError, SurrealErrorStore};

fn error(id: &str, category: ErrorCategory) -> DeploymentError {
    DeploymentError {
        error_id: id.to_string(),
        timestamp: Utc::now(),
        category,
        severity: ErrorSeverity::Medium,
        title: format!("{category} error in start:redis"),
        message: "connection refused on port 6379".to_string(),
        operation: "start:redis".to_string(),
        context: serde_json::json!({ "service": "redis" }),
        resolution_steps: vec!["Verify the port is not already bound".to_string()],
        auto_recovery_attempted: false,
        resolved: false,
        resolution_time: None,
        occurrences: 1,
    }
}

fn recovery(id: &str, success: bool) -> RecoveryRecord {
    RecoveryRecord {
        error_id: id.to_string(),
        action_type: "restart_service".to_string(),
        description: "Restart the failing service".to_string(),
        command: Some("docker compose restart redis".to_string()),
        executed_at: Utc::now(),
        success,
        execution_time_ms: 42,
        output: "restarted".to_string(),
        error_message: None,
    }
}

async fn stores() -> Vec<(&'static str, Box<dyn ErrorStore>)> {
    vec![
        ("memory", Box::new(MemoryErrorStore::new())),
        (
            "surreal",
            Box::new(SurrealErrorStore::in_memory().await.expect("surreal mem store")),
        ),
    ]
}

#[tokio::test]
async fn upsert_inserts_then_updates_same_id() {
    for (name, store) in stores().await {
        let first = error("e-1", ErrorCategory::Network);
        assert_eq!(
            store.upsert_error(&first).await.unwrap(),
            UpsertOutcome::Inserted,
            "{name}"
        );

        let again = error("e-1", ErrorCategory::Network);
        assert_eq!(
            store.upsert_error(&again).await.unwrap(),
            UpsertOutcome::Updated { occurrences: 2 },
            "{name}"
        );

        let all = store.list_errors(&ErrorFilter::all()).await.unwrap();
        assert_eq!(all.len(), 1, "{name}: recurrence must not duplicate");
        assert_eq!(all[0].occurrences, 2, "{name}");
    }
}

#[tokio::test]
async fn get_missing_error_is_none() {
    for (name, store) in stores().await {
        assert!(store.get_error("nope").await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn mark_resolved_flips_flag() {
    for (name, store) in stores().await {
        store
            .upsert_error(&error("e-2", ErrorCategory::Docker))
            .await
            .unwrap();
        let at = Utc::now();
        store.mark_resolved("e-2", at).await.unwrap();

        let got = store.get_error("e-2").await.unwrap().unwrap();
        assert!(got.resolved, "{name}");
        assert!(got.resolution_time.is_some(), "{name}");

        let unresolved = store.list_errors(&ErrorFilter::unresolved()).await.unwrap();
        assert!(unresolved.is_empty(), "{name}");
    }
}

#[tokio::test]
async fn mark_resolved_missing_is_not_found() {
    for (name, store) in stores().await {
        let err = store.mark_resolved("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StorageError::ErrorNotFound { .. }), "{name}");
    }
}

#[tokio::test]
async fn recurrence_reopens_resolved_error() {
    for (name, store) in stores().await {
        store
            .upsert_error(&error("e-3", ErrorCategory::Network))
            .await
            .unwrap();
        store.mark_resolved("e-3", Utc::now()).await.unwrap();
        store
            .upsert_error(&error("e-3", ErrorCategory::Network))
            .await
            .unwrap();

        let got = store.get_error("e-3").await.unwrap().unwrap();
        assert!(!got.resolved, "{name}");
    }
}

#[tokio::test]
async fn record_recovery_requires_parent() {
    for (name, store) in stores().await {
        let err = store
            .record_recovery(&recovery("orphan", true))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ErrorNotFound { .. }), "{name}");
    }
}

#[tokio::test]
async fn record_recovery_marks_attempted_and_lists_in_order() {
    for (name, store) in stores().await {
        store
            .upsert_error(&error("e-4", ErrorCategory::Dependency))
            .await
            .unwrap();

        let mut early = recovery("e-4", false);
        early.executed_at = Utc::now() - Duration::seconds(30);
        let late = recovery("e-4", true);

        store.record_recovery(&late).await.unwrap();
        store.record_recovery(&early).await.unwrap();

        let parent = store.get_error("e-4").await.unwrap().unwrap();
        assert!(parent.auto_recovery_attempted, "{name}");

        let records = store.recoveries_for("e-4").await.unwrap();
        assert_eq!(records.len(), 2, "{name}");
        assert!(!records[0].success, "{name}: oldest first");
        assert!(records[1].success, "{name}");
    }
}

#[tokio::test]
async fn list_filters_by_category_and_limit() {
    for (name, store) in stores().await {
        let mut older = error("net-old", ErrorCategory::Network);
        older.timestamp = Utc::now() - Duration::minutes(5);
        store.upsert_error(&older).await.unwrap();
        store
            .upsert_error(&error("net-new", ErrorCategory::Network))
            .await
            .unwrap();
        store
            .upsert_error(&error("dock", ErrorCategory::Docker))
            .await
            .unwrap();

        let network = store
            .list_errors(&ErrorFilter::all().with_category(ErrorCategory::Network))
            .await
            .unwrap();
        assert_eq!(network.len(), 2, "{name}");
        assert_eq!(network[0].error_id, "net-new", "{name}: newest first");

        let limited = store
            .list_errors(&ErrorFilter::all().with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1, "{name}");
    }
}
