//! This module provides a concrete implementation of the repository traits
//! using SQLite.

use std::str::FromStr;

use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};

pub mod app_repository;
pub mod key_value_store;

use crate::persistence::error::PersistenceError;

/// A concrete implementation of `AppRepository` and `KeyValueStore` backed
/// by SQLite.
pub struct SqliteRepository {
    /// The SQLite connection pool used for database operations.
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Creates a new instance of SqliteRepository with the provided database
    /// URL. This will create the database file if it does not exist.
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        tracing::debug!(database_url, "Attempting to connect to SQLite database.");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::InvalidInput(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            PersistenceError::OperationFailed(format!("Failed to connect to database: {}", e))
        })?;
        tracing::info!(database_url, "Successfully connected to SQLite database.");
        Ok(Self { pool })
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<(), PersistenceError> {
        tracing::debug!("Running database migrations.");
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run database migrations.");
            PersistenceError::MigrationError(e.to_string())
        })?;
        tracing::info!("Database migrations completed successfully.");
        Ok(())
    }

    /// Direct access to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the connection pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite connection pool closed.");
    }

    /// Maps an sqlx error to a `PersistenceError`, surfacing unique-constraint
    /// violations as `AlreadyExists`.
    pub(crate) fn map_db_error(operation: &str, e: sqlx::Error) -> PersistenceError {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return PersistenceError::AlreadyExists(operation.to_string());
            }
        }
        tracing::error!(error = %e, operation = %operation, "Database operation failed.");
        PersistenceError::OperationFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::{
        models::{
            EventStatus, IncidentFilter, NewEvent, NewNormalizedEvent, NewRule, NewUser,
            RuleConditions, Severity,
        },
        persistence::traits::{AppRepository, KeyValueStore},
    };

    async fn setup_test_db() -> SqliteRepository {
        let repo =
            SqliteRepository::new("sqlite::memory:").await.expect("Failed to connect to db");
        repo.run_migrations().await.expect("Failed to run migrations");
        repo
    }

    async fn create_test_user(repo: &SqliteRepository) -> i64 {
        repo.create_user(&NewUser {
            alert_id: "alert-1".to_string(),
            telegram_chat_id: Some("123".to_string()),
            telegram_verified: true,
            ..Default::default()
        })
        .await
        .expect("Failed to create user")
        .id
    }

    #[tokio::test]
    async fn test_user_lookup_by_alert_id() {
        let repo = setup_test_db().await;
        let user_id = create_test_user(&repo).await;

        let found = repo.find_user_by_alert_id("alert-1").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user_id));

        let missing = repo.find_user_by_alert_id("unknown").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_event_insert_and_status_transition() {
        let repo = setup_test_db().await;
        let user_id = create_test_user(&repo).await;

        let event = repo
            .insert_event(&NewEvent {
                user_id,
                source: "easyconnect:alert-1".to_string(),
                payload: json!({"event_type": "Transfer"}),
                signature: None,
            })
            .await
            .unwrap();
        assert_eq!(event.status, EventStatus::Pending);

        repo.update_event_status(event.id, EventStatus::Parsed).await.unwrap();
    }

    #[tokio::test]
    async fn test_rule_name_unique_per_owner() {
        let repo = setup_test_db().await;
        let user_id = create_test_user(&repo).await;

        let rule = NewRule {
            name: "whale".to_string(),
            description: None,
            severity: Severity::Critical,
            kind: Some("WhaleTransfer".to_string()),
            scope: None,
            conditions: RuleConditions::default(),
            aggregation_window_seconds: None,
            aggregation_min_count: 1,
            deduplication_key_template: None,
            cooldown_seconds: 300,
            enabled: true,
        };

        repo.create_rule(user_id, &rule).await.unwrap();
        let duplicate = repo.create_rule(user_id, &rule).await;
        assert!(matches!(duplicate, Err(PersistenceError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_count_similar_events_respects_window_and_contract() {
        let repo = setup_test_db().await;
        let now = Utc::now();

        for i in 0..3 {
            repo.insert_normalized_event(&NewNormalizedEvent {
                event_id: None,
                chain: "QUBIC".to_string(),
                contract_address: Some("QX".to_string()),
                contract_label: Some("QX".to_string()),
                event_name: "TransferFailed".to_string(),
                tx_hash: None,
                tx_status: "failure".to_string(),
                from_address: None,
                to_address: None,
                amount: None,
                token_symbol: "QUBIC".to_string(),
                block_height: None,
                tick: None,
                timestamp: now - chrono::Duration::seconds(10 * i),
                metadata: json!({}),
            })
            .await
            .unwrap();
        }

        let window_start = now - chrono::Duration::seconds(60);
        let count = repo
            .count_similar_events("TransferFailed", Some("QX"), window_start, now)
            .await
            .unwrap();
        assert_eq!(count, 3);

        let other_contract = repo
            .count_similar_events("TransferFailed", Some("QUTIL"), window_start, now)
            .await
            .unwrap();
        assert_eq!(other_contract, 0);

        let narrow_window = repo
            .count_similar_events(
                "TransferFailed",
                Some("QX"),
                now - chrono::Duration::seconds(15),
                now,
            )
            .await
            .unwrap();
        assert_eq!(narrow_window, 2);
    }

    #[tokio::test]
    async fn test_dedup_key_seen_since_respects_cutoff() {
        let repo = setup_test_db().await;
        let user_id = create_test_user(&repo).await;
        let now = Utc::now();

        let incident = repo
            .insert_incident(&crate::models::NewIncident {
                user_id,
                severity: Severity::Critical,
                kind: "WhaleTransfer".to_string(),
                scope: None,
                title: "whale".to_string(),
                description: None,
                protocol: None,
                contract_address: None,
                primary_wallet: None,
                first_seen_at: now,
                last_seen_at: now,
                rule_id: None,
                detection_id: None,
                deduplication_key: Some("42:SENDER:2026-08-01".to_string()),
                tags: vec![],
                metadata: json!({}),
            })
            .await
            .unwrap();

        // A cutoff before creation sees the incident; a later cutoff does
        // not, so a second event past the cooldown creates a new incident.
        let before = incident.created_at - chrono::Duration::seconds(60);
        assert!(repo.dedup_key_seen_since("42:SENDER:2026-08-01", before).await.unwrap());

        let after = incident.created_at + chrono::Duration::seconds(60);
        assert!(!repo.dedup_key_seen_since("42:SENDER:2026-08-01", after).await.unwrap());

        assert!(!repo.dedup_key_seen_since("42:OTHER:2026-08-01", before).await.unwrap());
    }

    #[tokio::test]
    async fn test_incident_listing_pagination_and_filter() {
        let repo = setup_test_db().await;
        let user_id = create_test_user(&repo).await;
        let now = Utc::now();

        for i in 0..5 {
            repo.insert_incident(&crate::models::NewIncident {
                user_id,
                severity: if i % 2 == 0 { Severity::Critical } else { Severity::Low },
                kind: "WhaleTransfer".to_string(),
                scope: None,
                title: format!("incident {i}"),
                description: None,
                protocol: None,
                contract_address: None,
                primary_wallet: None,
                first_seen_at: now,
                last_seen_at: now,
                rule_id: None,
                detection_id: None,
                deduplication_key: None,
                tags: vec![],
                metadata: json!({}),
            })
            .await
            .unwrap();
        }

        let (page, total) =
            repo.list_incidents(user_id, &IncidentFilter::default(), 1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 5);

        let filter = IncidentFilter { severity: Some(Severity::Critical), status: None };
        let (critical, total_critical) =
            repo.list_incidents(user_id, &filter, 1, 10).await.unwrap();
        assert_eq!(critical.len(), 3);
        assert_eq!(total_critical, 3);
    }

    #[tokio::test]
    async fn test_json_state_round_trip_and_prefix_scan() {
        let repo = setup_test_db().await;

        repo.set_json_state("batch_state:1:MEDIUM", &json!({"n": 1})).await.unwrap();
        repo.set_json_state("batch_state:2:LOW", &json!({"n": 2})).await.unwrap();
        repo.set_json_state("other:key", &json!({"n": 3})).await.unwrap();

        let state: Option<serde_json::Value> =
            repo.get_json_state("batch_state:1:MEDIUM").await.unwrap();
        assert_eq!(state, Some(json!({"n": 1})));

        let all: Vec<(String, serde_json::Value)> =
            repo.get_all_json_states_by_prefix("batch_state:").await.unwrap();
        assert_eq!(all.len(), 2);

        repo.delete_json_state("batch_state:1:MEDIUM").await.unwrap();
        let gone: Option<serde_json::Value> =
            repo.get_json_state("batch_state:1:MEDIUM").await.unwrap();
        assert!(gone.is_none());
    }
}
