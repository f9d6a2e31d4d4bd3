//! SQLite implementation of the generic JSON state store.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::persistence::{
    error::PersistenceError, sqlite::SqliteRepository, traits::KeyValueStore,
};

#[async_trait]
impl KeyValueStore for SqliteRepository {
    async fn get_json_state<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistenceError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM application_state WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SqliteRepository::map_db_error("get_json_state", e))?;

        match row {
            Some((value,)) => {
                let state = serde_json::from_str(&value).map_err(|e| {
                    PersistenceError::SerializationError(format!(
                        "Failed to deserialize state for key '{}': {}",
                        key, e
                    ))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn set_json_state<T: Serialize + Send + Sync + 'static>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PersistenceError> {
        let serialized = serde_json::to_string(value).map_err(|e| {
            PersistenceError::SerializationError(format!(
                "Failed to serialize state for key '{}': {}",
                key, e
            ))
        })?;

        sqlx::query("INSERT OR REPLACE INTO application_state (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(serialized)
            .execute(&self.pool)
            .await
            .map_err(|e| SqliteRepository::map_db_error("set_json_state", e))?;
        Ok(())
    }

    async fn get_all_json_states_by_prefix<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, PersistenceError> {
        // LIKE treats '%' and '_' as wildcards; state keys never contain
        // either, so a plain suffix wildcard is safe here.
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM application_state WHERE key LIKE ?")
                .bind(format!("{}%", prefix))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SqliteRepository::map_db_error("get_all_json_states_by_prefix", e))?;

        let mut states = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            let state = serde_json::from_str(&value).map_err(|e| {
                PersistenceError::SerializationError(format!(
                    "Failed to deserialize state for key '{}': {}",
                    key, e
                ))
            })?;
            states.push((key, state));
        }
        Ok(states)
    }

    async fn delete_json_state(&self, key: &str) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM application_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| SqliteRepository::map_db_error("delete_json_state", e))?;
        Ok(())
    }
}
