//! Calculation orchestration.
//!
//! Each request walks a fixed sequence of states:
//!
//! ```text
//! Received -> HashComputed -> CacheLookup -> CacheHit -> Done
//!                                         \-> CacheMiss -> Computing -> SnapshotWrite -> CachePopulate -> Done
//! ```
//!
//! Only the snapshot store and the cache are awaited, each under
//! [`PipelineConfig::io_timeout`]. Their failures are logged and the request
//! falls back to direct computation. A failure while computing ends the
//! request before anything is written.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calculations::{FederalTaxEngine, StateRegistry};
use crate::error::CalcError;
use crate::hashing::{CalculationInput, InputHash, hash_value};
use crate::models::{CacheKey, CalculationResult, NewSnapshot, Snapshot, StateCode, TaxReturn};
use crate::store::{Backend, CalculationCache, SnapshotStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub cache_ttl: Duration,
    /// Upper bound on every single store or cache call.
    pub io_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            io_timeout: Duration::from_secs(2),
        }
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    /// An existing snapshot for the same return and input.
    Snapshot,
    /// Computed now and persisted.
    Computed,
    /// Computed now; the snapshot store was unavailable.
    ComputedUncached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub result: CalculationResult,
    pub source: ResultSource,
}

/// One record per calculation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub return_id: i64,
    /// Absent when the request failed before hashing.
    pub input_hash: Option<InputHash>,
    pub output_hash: Option<InputHash>,
    pub duration: Duration,
    pub success: bool,
    pub source: Option<ResultSource>,
}

/// Best-effort audit trail. Errors are logged and never fail a request.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), StoreError>;
}

/// Writes audit records as `tracing` events on the `tax_audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        info!(
            target: "tax_audit",
            return_id = record.return_id,
            input_hash = record.input_hash.as_ref().map(InputHash::as_str),
            output_hash = record.output_hash.as_ref().map(InputHash::as_str),
            duration_us = record.duration.as_micros() as u64,
            success = record.success,
            source = ?record.source,
            "calculation"
        );
        Ok(())
    }
}

/// How [`CalculationPipeline::get_snapshot`] finds a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRef {
    Id(i64),
    Hash(InputHash),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub cache_entries: u64,
    pub stale_snapshots: u64,
}

/// Entry point for every calculation.
///
/// Cheap to share behind an `Arc`; all state is either immutable or owned
/// by the store and cache, which synchronize internally.
pub struct CalculationPipeline {
    engine: FederalTaxEngine,
    states: Arc<StateRegistry>,
    snapshots: Arc<dyn SnapshotStore>,
    cache: Arc<dyn CalculationCache>,
    audit: Arc<dyn AuditSink>,
    config: PipelineConfig,
}

impl CalculationPipeline {
    pub fn new(
        engine: FederalTaxEngine,
        states: Arc<StateRegistry>,
        backend: Backend,
    ) -> Self {
        Self {
            engine,
            states,
            snapshots: backend.snapshots,
            cache: backend.cache,
            audit: Arc::new(TracingAuditSink),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Calculates federal and, when `state` is given, state tax.
    ///
    /// # Errors
    ///
    /// Validation, jurisdiction, configuration and arithmetic errors. Store
    /// and cache failures are never returned.
    pub async fn calculate(
        &self,
        tax_return: &TaxReturn,
        tax_year: i32,
        state: Option<StateCode>,
    ) -> Result<PipelineOutcome, CalcError> {
        self.run(tax_return, tax_year, state, None).await
    }

    /// Like [`calculate`](Self::calculate), recording `parent_snapshot_id`
    /// on the new snapshot.
    ///
    /// The parent is part of the hashed input, so a scenario is persisted
    /// as its own snapshot even when the return matches one already
    /// calculated.
    ///
    /// # Errors
    ///
    /// [`CalcError::Validation`] on `parent_snapshot_id` when the parent
    /// does not exist, plus everything `calculate` returns.
    pub async fn calculate_scenario(
        &self,
        parent_snapshot_id: i64,
        tax_return: &TaxReturn,
        state: Option<StateCode>,
    ) -> Result<PipelineOutcome, CalcError> {
        self.run(tax_return, tax_return.tax_year, state, Some(parent_snapshot_id))
            .await
    }

    /// Drops the return's cache entries and marks its snapshots stale.
    ///
    /// # Errors
    ///
    /// [`CalcError::StoreUnavailable`] if either step fails.
    pub async fn invalidate_return(&self, return_id: i64) -> Result<Invalidation, CalcError> {
        let cache_entries = self.io(self.cache.invalidate(return_id)).await?;
        let stale_snapshots = self.io(self.snapshots.mark_stale(return_id)).await?;
        info!(return_id, cache_entries, stale_snapshots, "return invalidated");
        Ok(Invalidation {
            cache_entries,
            stale_snapshots,
        })
    }

    /// Global flush, used when tax parameters change.
    pub async fn invalidate_all(&self) -> Result<u64, CalcError> {
        let removed = self.io(self.cache.invalidate_all()).await?;
        info!(removed, "calculation cache flushed");
        Ok(removed)
    }

    pub async fn get_snapshot(&self, by: &SnapshotRef) -> Result<Option<Snapshot>, CalcError> {
        let snapshot = match by {
            SnapshotRef::Id(id) => self.io(self.snapshots.get_by_id(*id)).await?,
            SnapshotRef::Hash(hash) => self.io(self.snapshots.get_by_hash(hash)).await?,
        };
        Ok(snapshot)
    }

    pub async fn list_snapshots(&self, return_id: i64) -> Result<Vec<Snapshot>, CalcError> {
        Ok(self.io(self.snapshots.list_snapshots(return_id)).await?)
    }

    async fn io<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.config.io_timeout, op)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    fn write_audit(
        &self,
        return_id: i64,
        started: Instant,
        input_hash: Option<InputHash>,
        outcome: &Result<PipelineOutcome, CalcError>,
    ) {
        let record = match outcome {
            Ok(outcome) => AuditRecord {
                return_id,
                input_hash: Some(outcome.result.input_hash.clone()),
                output_hash: serde_json::to_value(&outcome.result)
                    .ok()
                    .map(|value| hash_value(&value)),
                duration: started.elapsed(),
                success: true,
                source: Some(outcome.source),
            },
            Err(_) => AuditRecord {
                return_id,
                input_hash,
                output_hash: None,
                duration: started.elapsed(),
                success: false,
                source: None,
            },
        };
        if let Err(e) = self.audit.record(&record) {
            warn!(return_id, error = %e, "audit record dropped");
        }
    }

    /// Runs one request and writes its audit record.
    async fn run(
        &self,
        tax_return: &TaxReturn,
        tax_year: i32,
        state: Option<StateCode>,
        parent_snapshot_id: Option<i64>,
    ) -> Result<PipelineOutcome, CalcError> {
        let started = Instant::now();
        let mut input_hash = None;
        let outcome = self
            .execute(tax_return, tax_year, state, parent_snapshot_id, &mut input_hash)
            .await;
        self.write_audit(tax_return.return_id, started, input_hash, &outcome);
        outcome
    }

    async fn check_parent(&self, parent_snapshot_id: i64) -> Result<(), CalcError> {
        match self.io(self.snapshots.get_by_id(parent_snapshot_id)).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(CalcError::validation(
                "parent_snapshot_id",
                format!("snapshot {parent_snapshot_id} does not exist"),
            )),
            Err(e) => {
                warn!(parent_snapshot_id, error = %e, "cannot verify scenario parent");
                Ok(())
            }
        }
    }

    async fn execute(
        &self,
        tax_return: &TaxReturn,
        tax_year: i32,
        state: Option<StateCode>,
        parent_snapshot_id: Option<i64>,
        input_hash: &mut Option<InputHash>,
    ) -> Result<PipelineOutcome, CalcError> {
        let return_id = tax_return.return_id;
        debug!(return_id, tax_year, state = ?state, "received");

        if tax_year != tax_return.tax_year {
            return Err(CalcError::validation(
                "tax_year",
                format!(
                    "requested {tax_year} but the return is for {}",
                    tax_return.tax_year
                ),
            ));
        }
        let federal_params = self.engine.parameters(tax_year)?;
        let calculator = match state {
            Some(code) => Some(self.states.get(code, tax_year)?),
            None => None,
        };

        let mut input = CalculationInput::new(
            tax_return,
            &federal_params,
            calculator.map(|c| c.config()),
        )?;
        if let Some(parent) = parent_snapshot_id {
            input = input.with_parent(parent);
        }
        *input_hash = Some(input.hash.clone());
        let key = CacheKey::new(return_id, input.hash.clone());
        debug!(return_id, input_hash = %input.hash, "hash computed");

        if let Some(parent) = parent_snapshot_id {
            self.check_parent(parent).await?;
        }

        match self.io(self.cache.get(&key)).await {
            Ok(Some(result)) => {
                debug!(return_id, input_hash = %input.hash, "cache hit");
                return Ok(PipelineOutcome {
                    result,
                    source: ResultSource::Cache,
                });
            }
            Ok(None) => debug!(return_id, "cache miss"),
            Err(e) => warn!(return_id, error = %e, "cache lookup failed; continuing without cache"),
        }

        match self.io(self.snapshots.get_for_return(return_id, &input.hash)).await {
            Ok(Some(snapshot)) => match snapshot.result() {
                Ok(result) => {
                    debug!(return_id, snapshot_id = snapshot.snapshot_id, "snapshot reused");
                    self.populate_cache(key, &result).await;
                    return Ok(PipelineOutcome {
                        result,
                        source: ResultSource::Snapshot,
                    });
                }
                Err(e) => warn!(
                    return_id,
                    snapshot_id = snapshot.snapshot_id,
                    error = %e,
                    "stored result unreadable; recomputing"
                ),
            },
            Ok(None) => {}
            Err(e) => warn!(return_id, error = %e, "snapshot lookup failed; recomputing"),
        }

        // Computing
        let federal = self.engine.calculate(tax_return)?;
        let state_breakdown = match calculator {
            Some(calculator) => Some(calculator.calculate(tax_return, &federal)?),
            None => None,
        };
        let computed = CalculationResult {
            input_hash: input.hash.clone(),
            snapshot_id: None,
            federal,
            state: state_breakdown,
        };

        // SnapshotWrite
        let (result, source) = match self
            .persist(return_id, &input, &computed, parent_snapshot_id)
            .await
        {
            Ok(result) => (result, ResultSource::Computed),
            Err(e) => {
                warn!(return_id, error = %e, "snapshot write failed; returning uncached result");
                return Ok(PipelineOutcome {
                    result: computed,
                    source: ResultSource::ComputedUncached,
                });
            }
        };

        // CachePopulate
        self.populate_cache(key, &result).await;
        info!(
            return_id,
            input_hash = %result.input_hash,
            snapshot_id = result.snapshot_id,
            total_tax = %result.federal.total_tax,
            "calculation complete"
        );
        Ok(PipelineOutcome { result, source })
    }

    /// Saves the snapshot and returns the persisted result, which is the
    /// first writer's when another request won the race.
    async fn persist(
        &self,
        return_id: i64,
        input: &CalculationInput,
        computed: &CalculationResult,
        parent_snapshot_id: Option<i64>,
    ) -> Result<CalculationResult, StoreError> {
        let federal = &computed.federal;
        let snapshot = NewSnapshot {
            return_id,
            input_hash: input.hash.clone(),
            input_data: input.document.clone(),
            result_data: serde_json::to_value(computed)?,
            tax_year: federal.tax_year,
            filing_status: federal.filing_status,
            state_code: computed.state.as_ref().map(|s| s.state_code),
            total_tax: federal.total_tax,
            effective_rate: federal.effective_rate,
            parent_snapshot_id,
        };

        let outcome = self.io(self.snapshots.save(snapshot)).await?;
        if !outcome.created {
            debug!(
                snapshot_id = outcome.snapshot.snapshot_id,
                "input already persisted; using stored result"
            );
        }
        Ok(outcome.snapshot.result()?)
    }

    async fn populate_cache(
        &self,
        key: CacheKey,
        result: &CalculationResult,
    ) {
        let return_id = key.return_id;
        if let Err(e) = self
            .io(self.cache.set(key, result.clone(), self.config.cache_ttl))
            .await
        {
            warn!(return_id, error = %e, "cache write failed");
        }
    }
}
