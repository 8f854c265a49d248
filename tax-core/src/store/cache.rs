use std::time::Duration;

use async_trait::async_trait;

use super::repository::StoreError;
use crate::models::{CacheKey, CalculationResult};

/// Derivative fast path in front of the snapshot store.
///
/// Entries can always be rebuilt by recomputing, so every method may fail
/// and callers are expected to carry on without the cache.
#[async_trait]
pub trait CalculationCache: Send + Sync {
    /// Live entry for the key; expired entries read as absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<CalculationResult>, StoreError>;

    async fn set(
        &self,
        key: CacheKey,
        value: CalculationResult,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Drops every entry of one return. Returns the number removed.
    async fn invalidate(&self, return_id: i64) -> Result<u64, StoreError>;

    async fn invalidate_all(&self) -> Result<u64, StoreError>;
}
