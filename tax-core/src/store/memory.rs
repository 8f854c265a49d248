//! Process-local backends built on `DashMap`.
//!
//! Used by tests and single-process deployments. Nothing survives a
//! restart, which is fine for the cache and acceptable for snapshots only
//! when persistence is not required.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use super::cache::CalculationCache;
use super::repository::{SaveOutcome, SnapshotStore, StoreError};
use crate::hashing::InputHash;
use crate::models::{CacheKey, CalculationResult, NewSnapshot, Snapshot};

#[derive(Debug)]
pub struct MemorySnapshotStore {
    next_id: AtomicI64,
    snapshots: DashMap<i64, Snapshot>,
    by_return_hash: DashMap<(i64, InputHash), i64>,
    stale: DashSet<i64>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            snapshots: DashMap::new(),
            by_return_hash: DashMap::new(),
            stale: DashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    fn snapshot(&self, snapshot_id: i64) -> Option<Snapshot> {
        self.snapshots.get(&snapshot_id).map(|s| s.value().clone())
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: NewSnapshot) -> Result<SaveOutcome, StoreError> {
        let key = (snapshot.return_id, snapshot.input_hash.clone());

        // The entry guard holds the shard lock, so check and insert are one step.
        match self.by_return_hash.entry(key) {
            Entry::Occupied(existing) => {
                let snapshot_id = *existing.get();
                drop(existing);
                let snapshot = self.snapshot(snapshot_id).ok_or(StoreError::NotFound)?;
                Ok(SaveOutcome {
                    snapshot,
                    created: false,
                })
            }
            Entry::Vacant(slot) => {
                let snapshot_id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let snapshot = snapshot.into_snapshot(snapshot_id, Utc::now());
                self.snapshots.insert(snapshot_id, snapshot.clone());
                slot.insert(snapshot_id);
                Ok(SaveOutcome {
                    snapshot,
                    created: true,
                })
            }
        }
    }

    async fn get_by_id(&self, snapshot_id: i64) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshot(snapshot_id))
    }

    async fn get_by_hash(&self, input_hash: &InputHash) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .snapshots
            .iter()
            .filter(|s| &s.input_hash == input_hash)
            .min_by_key(|s| s.snapshot_id)
            .map(|s| s.value().clone()))
    }

    async fn get_for_return(
        &self,
        return_id: i64,
        input_hash: &InputHash,
    ) -> Result<Option<Snapshot>, StoreError> {
        let snapshot_id = self
            .by_return_hash
            .get(&(return_id, input_hash.clone()))
            .map(|id| *id);
        Ok(snapshot_id.and_then(|id| self.snapshot(id)))
    }

    async fn list_snapshots(&self, return_id: i64) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots: Vec<Snapshot> = self
            .snapshots
            .iter()
            .filter(|s| s.return_id == return_id)
            .map(|s| s.value().clone())
            .collect();
        snapshots.sort_by_key(|s| s.snapshot_id);
        Ok(snapshots)
    }

    async fn mark_stale(&self, return_id: i64) -> Result<u64, StoreError> {
        let ids: Vec<i64> = self
            .snapshots
            .iter()
            .filter(|s| s.return_id == return_id)
            .map(|s| s.snapshot_id)
            .collect();
        Ok(ids.into_iter().filter(|id| self.stale.insert(*id)).count() as u64)
    }

    async fn is_stale(&self, snapshot_id: i64) -> Result<bool, StoreError> {
        if !self.snapshots.contains_key(&snapshot_id) {
            return Err(StoreError::NotFound);
        }
        Ok(self.stale.contains(&snapshot_id))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CalculationResult,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryCalculationCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryCalculationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CalculationCache for MemoryCalculationCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CalculationResult>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key)
            && entry.expires_at > now
        {
            return Ok(Some(entry.value.clone()));
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(
        &self,
        key: CacheKey,
        value: CalculationResult,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Configuration(format!("cache ttl {ttl:?} overflows")))?;
        self.entries.insert(key, CacheEntry { value, expires_at });
        Ok(())
    }

    async fn invalidate(&self, return_id: i64) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        self.entries.retain(|key, _| {
            let keep = key.return_id != return_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn invalidate_all(&self) -> Result<u64, StoreError> {
        let removed = self.entries.len() as u64;
        self.entries.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::hashing::hash_value;
    use crate::models::FilingStatusCode;
    use crate::test_support::{federal_engine, single_wage_earner};

    fn new_snapshot(
        return_id: i64,
        input_hash: &InputHash,
        total_tax: rust_decimal::Decimal,
    ) -> NewSnapshot {
        NewSnapshot {
            return_id,
            input_hash: input_hash.clone(),
            input_data: json!({"return": return_id}),
            result_data: json!({"total_tax": total_tax.to_string()}),
            tax_year: 2025,
            filing_status: FilingStatusCode::Single,
            state_code: None,
            total_tax,
            effective_rate: dec!(0.1194),
            parent_snapshot_id: None,
        }
    }

    fn cached_result() -> CalculationResult {
        let federal = federal_engine().calculate(&single_wage_earner()).unwrap();
        CalculationResult {
            input_hash: hash_value(&json!({"id": 1})),
            snapshot_id: Some(1),
            federal,
            state: None,
        }
    }

    // =========================================================================
    // snapshot store tests
    // =========================================================================

    #[tokio::test]
    async fn second_save_returns_first_snapshot() {
        let store = MemorySnapshotStore::new();
        let hash = hash_value(&json!({"wages": 85000}));

        let first = store.save(new_snapshot(1, &hash, dec!(10149))).await.unwrap();
        let second = store.save(new_snapshot(1, &hash, dec!(99999))).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.snapshot, first.snapshot);
        assert_eq!(second.snapshot.total_tax, dec!(10149));
        assert_eq!(
            store.get_by_hash(&hash).await.unwrap(),
            Some(first.snapshot)
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn same_hash_on_another_return_is_a_new_snapshot() {
        let store = MemorySnapshotStore::new();
        let hash = hash_value(&json!({"wages": 85000}));

        let first = store.save(new_snapshot(1, &hash, dec!(10149))).await.unwrap();
        let other = store.save(new_snapshot(2, &hash, dec!(10149))).await.unwrap();

        assert!(other.created);
        assert_ne!(first.snapshot.snapshot_id, other.snapshot.snapshot_id);
        assert_eq!(
            store.get_by_hash(&hash).await.unwrap().map(|s| s.snapshot_id),
            Some(first.snapshot.snapshot_id)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_persist_one_snapshot() {
        let store = Arc::new(MemorySnapshotStore::new());
        let hash = hash_value(&json!({"wages": 85000}));

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            let hash = hash.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(new_snapshot(7, &hash, rust_decimal::Decimal::from(i)))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        let mut created = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            created += usize::from(outcome.created);
            ids.push(outcome.snapshot.snapshot_id);
        }

        assert_eq!(created, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.list_snapshots(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lookups_by_id_and_return() {
        let store = MemorySnapshotStore::new();
        let a = hash_value(&json!({"v": 1}));
        let b = hash_value(&json!({"v": 2}));

        let first = store.save(new_snapshot(1, &a, dec!(1))).await.unwrap().snapshot;
        let second = store.save(new_snapshot(1, &b, dec!(2))).await.unwrap().snapshot;

        assert_eq!(
            store.get_by_id(second.snapshot_id).await.unwrap(),
            Some(second.clone())
        );
        assert_eq!(store.get_for_return(1, &a).await.unwrap(), Some(first.clone()));
        assert_eq!(store.get_for_return(2, &a).await.unwrap(), None);
        assert_eq!(store.get_by_id(999).await.unwrap(), None);
        assert_eq!(store.list_snapshots(1).await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn mark_stale_flags_existing_snapshots_once() {
        let store = MemorySnapshotStore::new();
        let hash = hash_value(&json!({"v": 1}));
        let snapshot = store.save(new_snapshot(1, &hash, dec!(1))).await.unwrap().snapshot;

        assert!(!store.is_stale(snapshot.snapshot_id).await.unwrap());
        assert_eq!(store.mark_stale(1).await.unwrap(), 1);
        assert_eq!(store.mark_stale(1).await.unwrap(), 0);
        assert!(store.is_stale(snapshot.snapshot_id).await.unwrap());
        assert_eq!(store.is_stale(999).await, Err(StoreError::NotFound));

        // Marking never removes history.
        assert_eq!(store.list_snapshots(1).await.unwrap().len(), 1);
    }

    // =========================================================================
    // cache tests
    // =========================================================================

    #[tokio::test]
    async fn cache_returns_live_entry() {
        let cache = MemoryCalculationCache::new();
        let key = CacheKey::new(1, hash_value(&json!({"v": 1})));

        cache
            .set(key.clone(), cached_result(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), Some(cached_result()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let cache = MemoryCalculationCache::new();
        let key = CacheKey::new(1, hash_value(&json!({"v": 1})));

        cache.set(key.clone(), cached_result(), Duration::ZERO).await.unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_drops_only_that_return() {
        let cache = MemoryCalculationCache::new();
        let ttl = Duration::from_secs(60);
        let a = CacheKey::new(1, hash_value(&json!({"v": 1})));
        let b = CacheKey::new(1, hash_value(&json!({"v": 2})));
        let c = CacheKey::new(2, hash_value(&json!({"v": 1})));
        for key in [&a, &b, &c] {
            cache.set(key.clone(), cached_result(), ttl).await.unwrap();
        }

        assert_eq!(cache.invalidate(1).await.unwrap(), 2);
        assert_eq!(cache.get(&a).await.unwrap(), None);
        assert!(cache.get(&c).await.unwrap().is_some());

        assert_eq!(cache.invalidate_all().await.unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn purge_expired_keeps_live_entries() {
        let cache = MemoryCalculationCache::new();
        let live = CacheKey::new(1, hash_value(&json!({"v": 1})));
        let dead = CacheKey::new(1, hash_value(&json!({"v": 2})));
        cache
            .set(live.clone(), cached_result(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.set(dead, cached_result(), Duration::ZERO).await.unwrap();

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
