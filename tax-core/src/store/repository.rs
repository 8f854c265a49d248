use async_trait::async_trait;
use thiserror::Error;

use crate::error::CalcError;
use crate::hashing::InputHash;
use crate::models::{NewSnapshot, Snapshot};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out waiting for the store")]
    Timeout,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<StoreError> for CalcError {
    fn from(e: StoreError) -> Self {
        CalcError::StoreUnavailable(e.to_string())
    }
}

/// Result of [`SnapshotStore::save`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// The stored snapshot: the new one, or the one that won the race.
    pub snapshot: Snapshot,
    pub created: bool,
}

/// Append-only, content-addressed snapshot persistence.
///
/// Implementations must make `save` an atomic insert-if-absent on
/// `(return_id, input_hash)`; concurrent writers of the same pair all
/// observe the first writer's snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: NewSnapshot) -> Result<SaveOutcome, StoreError>;

    async fn get_by_id(&self, snapshot_id: i64) -> Result<Option<Snapshot>, StoreError>;

    /// Earliest snapshot with this hash across all returns.
    async fn get_by_hash(&self, input_hash: &InputHash) -> Result<Option<Snapshot>, StoreError>;

    async fn get_for_return(
        &self,
        return_id: i64,
        input_hash: &InputHash,
    ) -> Result<Option<Snapshot>, StoreError>;

    /// Every snapshot of a return, oldest first.
    async fn list_snapshots(&self, return_id: i64) -> Result<Vec<Snapshot>, StoreError>;

    /// Flags the return's existing snapshots as no longer current.
    /// Returns how many were newly marked.
    async fn mark_stale(&self, return_id: i64) -> Result<u64, StoreError>;

    async fn is_stale(&self, snapshot_id: i64) -> Result<bool, StoreError>;
}
