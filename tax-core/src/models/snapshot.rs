use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::hashing::InputHash;
use crate::models::{
    CalculationBreakdown, FilingStatusCode, StateCalculationBreakdown, StateCode,
};

/// Immutable, hash-keyed record of one calculation's inputs and outputs.
///
/// Snapshots are superseded, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: i64,
    pub return_id: i64,
    pub input_hash: InputHash,
    pub input_data: serde_json::Value,
    pub result_data: serde_json::Value,
    pub tax_year: i32,
    pub filing_status: FilingStatusCode,
    pub state_code: Option<StateCode>,
    pub total_tax: Decimal,
    pub effective_rate: Decimal,
    /// Snapshot a what-if scenario branched from.
    pub parent_snapshot_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Decodes the stored result.
    pub fn result(&self) -> Result<CalculationResult, serde_json::Error> {
        let mut result: CalculationResult = serde_json::from_value(self.result_data.clone())?;
        result.snapshot_id = Some(self.snapshot_id);
        Ok(result)
    }
}

/// A snapshot as submitted for saving; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub return_id: i64,
    pub input_hash: InputHash,
    pub input_data: serde_json::Value,
    pub result_data: serde_json::Value,
    pub tax_year: i32,
    pub filing_status: FilingStatusCode,
    pub state_code: Option<StateCode>,
    pub total_tax: Decimal,
    pub effective_rate: Decimal,
    pub parent_snapshot_id: Option<i64>,
}

impl NewSnapshot {
    pub fn into_snapshot(
        self,
        snapshot_id: i64,
        created_at: DateTime<Utc>,
    ) -> Snapshot {
        Snapshot {
            snapshot_id,
            return_id: self.return_id,
            input_hash: self.input_hash,
            input_data: self.input_data,
            result_data: self.result_data,
            tax_year: self.tax_year,
            filing_status: self.filing_status,
            state_code: self.state_code,
            total_tax: self.total_tax,
            effective_rate: self.effective_rate,
            parent_snapshot_id: self.parent_snapshot_id,
            created_at,
        }
    }
}

/// Cache key: the owning return plus the hash of the calculation context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub return_id: i64,
    pub context_hash: InputHash,
}

impl CacheKey {
    pub fn new(
        return_id: i64,
        context_hash: InputHash,
    ) -> Self {
        Self {
            return_id,
            context_hash,
        }
    }
}

/// What a calculation returns to callers and what the cache holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub input_hash: InputHash,
    /// Absent when the snapshot store was unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,
    pub federal: CalculationBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateCalculationBreakdown>,
}

impl CalculationResult {
    /// Federal plus state and local tax.
    pub fn combined_total_tax(&self) -> Decimal {
        self.federal.total_tax
            + self
                .state
                .as_ref()
                .map_or(Decimal::ZERO, |state| state.net_tax_liability)
    }
}
