//! Snapshot persistence and the calculation cache.

pub mod cache;
pub mod factory;
pub mod memory;
pub mod repository;

pub use cache::CalculationCache;
pub use factory::{Backend, BackendFactory, BackendRegistry, DbConfig, MemoryBackendFactory};
pub use memory::{MemoryCalculationCache, MemorySnapshotStore};
pub use repository::{SaveOutcome, SnapshotStore, StoreError};
