use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tax_core::{
    FilingStatusCode, InputHash, NewSnapshot, SaveOutcome, Snapshot, SnapshotStore, StateCode,
    StoreError,
};
use tracing::debug;

use crate::decimal::{decimal_to_text, get_decimal};
use crate::{SqliteStore, database_error};

const SNAPSHOT_COLUMNS: &str = "snapshot_id, return_id, input_hash, input_data, result_data,
     tax_year, filing_status, state_code, total_tax, effective_rate,
     parent_snapshot_id, created_at";

fn column<'r, T>(
    row: &'r SqliteRow,
    name: &str,
) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Database(format!("Failed to get '{}': {}", name, e)))
}

fn row_to_snapshot(row: &SqliteRow) -> Result<Snapshot, StoreError> {
    let input_hash: String = column(row, "input_hash")?;
    let filing_status: String = column(row, "filing_status")?;
    let state_code: Option<String> = column(row, "state_code")?;
    let input_data: String = column(row, "input_data")?;
    let result_data: String = column(row, "result_data")?;

    Ok(Snapshot {
        snapshot_id: column(row, "snapshot_id")?,
        return_id: column(row, "return_id")?,
        input_hash: InputHash::parse(&input_hash)
            .map_err(|e| StoreError::Database(e.to_string()))?,
        input_data: serde_json::from_str(&input_data)?,
        result_data: serde_json::from_str(&result_data)?,
        tax_year: column(row, "tax_year")?,
        filing_status: FilingStatusCode::parse(&filing_status).ok_or_else(|| {
            StoreError::Database(format!("Invalid status code: {}", filing_status))
        })?,
        state_code: state_code
            .as_deref()
            .map(StateCode::parse)
            .transpose()
            .map_err(|e| StoreError::Database(e.to_string()))?,
        total_tax: get_decimal(row, "total_tax")?,
        effective_rate: get_decimal(row, "effective_rate")?,
        parent_snapshot_id: column(row, "parent_snapshot_id")?,
        created_at: column(row, "created_at")?,
    })
}

impl SqliteStore {
    async fn fetch_snapshot(
        &self,
        filter: &str,
        bind_id: Option<i64>,
        bind_hash: Option<&InputHash>,
    ) -> Result<Option<Snapshot>, StoreError> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM calculation_snapshots WHERE {filter} ORDER BY snapshot_id LIMIT 1"
        );
        let mut query = sqlx::query(&sql);
        if let Some(id) = bind_id {
            query = query.bind(id);
        }
        if let Some(hash) = bind_hash {
            query = query.bind(hash.as_str());
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .as_ref()
            .map(row_to_snapshot)
            .transpose()
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn save(&self, snapshot: NewSnapshot) -> Result<SaveOutcome, StoreError> {
        let input_data = serde_json::to_string(&snapshot.input_data)?;
        let result_data = serde_json::to_string(&snapshot.result_data)?;

        // The unique (return_id, input_hash) index arbitrates concurrent writers.
        let inserted = sqlx::query(
            "INSERT INTO calculation_snapshots (
                return_id, input_hash, input_data, result_data, tax_year, filing_status,
                state_code, total_tax, effective_rate, parent_snapshot_id, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (return_id, input_hash) DO NOTHING",
        )
        .bind(snapshot.return_id)
        .bind(snapshot.input_hash.as_str())
        .bind(input_data)
        .bind(result_data)
        .bind(snapshot.tax_year)
        .bind(snapshot.filing_status.as_str())
        .bind(snapshot.state_code.as_ref().map(StateCode::as_str))
        .bind(decimal_to_text(snapshot.total_tax))
        .bind(decimal_to_text(snapshot.effective_rate))
        .bind(snapshot.parent_snapshot_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        let created = inserted.rows_affected() == 1;
        let stored = self
            .get_for_return(snapshot.return_id, &snapshot.input_hash)
            .await?
            .ok_or(StoreError::NotFound)?;
        debug!(
            snapshot_id = stored.snapshot_id,
            return_id = stored.return_id,
            created,
            "snapshot saved"
        );
        Ok(SaveOutcome {
            snapshot: stored,
            created,
        })
    }

    async fn get_by_id(&self, snapshot_id: i64) -> Result<Option<Snapshot>, StoreError> {
        self.fetch_snapshot("snapshot_id = ?", Some(snapshot_id), None)
            .await
    }

    async fn get_by_hash(&self, input_hash: &InputHash) -> Result<Option<Snapshot>, StoreError> {
        self.fetch_snapshot("input_hash = ?", None, Some(input_hash))
            .await
    }

    async fn get_for_return(
        &self,
        return_id: i64,
        input_hash: &InputHash,
    ) -> Result<Option<Snapshot>, StoreError> {
        self.fetch_snapshot(
            "return_id = ? AND input_hash = ?",
            Some(return_id),
            Some(input_hash),
        )
        .await
    }

    async fn list_snapshots(&self, return_id: i64) -> Result<Vec<Snapshot>, StoreError> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM calculation_snapshots WHERE return_id = ? ORDER BY snapshot_id"
        );
        let rows = sqlx::query(&sql)
            .bind(return_id)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.iter().map(row_to_snapshot).collect()
    }

    async fn mark_stale(&self, return_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO snapshot_stale_marks (snapshot_id, marked_at)
             SELECT snapshot_id, ? FROM calculation_snapshots WHERE return_id = ?",
        )
        .bind(Utc::now())
        .bind(return_id)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected())
    }

    async fn is_stale(&self, snapshot_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT m.snapshot_id IS NOT NULL AS stale
             FROM calculation_snapshots s
             LEFT JOIN snapshot_stale_marks m ON m.snapshot_id = s.snapshot_id
             WHERE s.snapshot_id = ?",
        )
        .bind(snapshot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?
        .ok_or(StoreError::NotFound)?;

        let stale: i64 = column(&row, "stale")?;
        Ok(stale != 0)
    }
}
