//! Tax calculation engine with content-addressed snapshots.
//!
//! The pure part ([`calculations`]) turns a [`TaxReturn`] into federal and
//! state breakdowns. The [`pipeline`] wraps it with input hashing, an
//! append-only [`store`] of snapshots and a TTL cache.

pub mod calculations;
pub mod error;
pub mod hashing;
pub mod models;
pub mod pipeline;
pub mod store;

#[cfg(test)]
mod test_support;

pub use calculations::{FederalTaxEngine, StateCalculator, StateRegistry, StateRegistryBuilder};
pub use error::{ArithmeticError, CalcError};
pub use hashing::{CalculationInput, InputHash};
pub use models::*;
pub use pipeline::{
    AuditRecord, AuditSink, CalculationPipeline, Invalidation, PipelineConfig, PipelineOutcome,
    ResultSource, SnapshotRef, TracingAuditSink,
};
pub use store::{
    Backend, BackendFactory, BackendRegistry, CalculationCache, DbConfig, SaveOutcome,
    SnapshotStore, StoreError,
};
