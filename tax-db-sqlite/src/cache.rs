use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tax_core::{CacheKey, CalculationCache, CalculationResult, StoreError};
use tracing::debug;

use crate::{SqliteStore, database_error};

fn expiry_millis(ttl: Duration) -> Result<i64, StoreError> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ttl| Utc::now().timestamp_millis().checked_add(ttl))
        .ok_or_else(|| StoreError::Configuration(format!("cache ttl {ttl:?} overflows")))
}

impl SqliteStore {
    /// Deletes expired cache rows. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM calculation_cache WHERE expires_at <= ?")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        debug!(removed = result.rows_affected(), "expired cache rows purged");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CalculationCache for SqliteStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CalculationResult>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT result_data FROM calculation_cache
             WHERE return_id = ? AND context_hash = ? AND expires_at > ?",
        )
        .bind(key.return_id)
        .bind(key.context_hash.as_str())
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        match row {
            Some((data,)) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: CacheKey,
        value: CalculationResult,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO calculation_cache (return_id, context_hash, result_data, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (return_id, context_hash)
             DO UPDATE SET result_data = excluded.result_data, expires_at = excluded.expires_at",
        )
        .bind(key.return_id)
        .bind(key.context_hash.as_str())
        .bind(data)
        .bind(expiry_millis(ttl)?)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;
        Ok(())
    }

    async fn invalidate(&self, return_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM calculation_cache WHERE return_id = ?")
            .bind(return_id)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(result.rows_affected())
    }

    async fn invalidate_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM calculation_cache")
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(result.rows_affected())
    }
}
