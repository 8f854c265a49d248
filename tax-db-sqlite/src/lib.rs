//! SQLite backend for the snapshot store and the calculation cache.
//!
//! One [`SqliteStore`] implements both [`tax_core::SnapshotStore`] and
//! [`tax_core::CalculationCache`] over a shared pool. The unique index on
//! `(return_id, input_hash)` makes snapshot saves atomic.

mod cache;
mod decimal;
mod factory;
mod snapshots;

pub use factory::SqliteBackendFactory;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tax_core::StoreError;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Maps a connection string onto a sqlx URL.
///
/// * `":memory:"` (or empty) - a private in-memory database
/// * `sqlite:...` - passed through
/// * anything else - a file path, created if missing
fn database_url(connection_string: &str) -> String {
    match connection_string {
        "" | ":memory:" => "sqlite::memory:".to_string(),
        url if url.starts_with("sqlite:") => url.to_string(),
        path => format!("sqlite://{path}?mode=rwc"),
    }
}

pub(crate) fn database_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => StoreError::Connection(e.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

impl SqliteStore {
    /// Opens the database. In-memory databases are pinned to a single
    /// connection that is never recycled, since each connection would
    /// otherwise see its own empty database.
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        let url = database_url(connection_string);
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StoreError::Configuration(format!("invalid sqlite url '{url}': {e}")))?
            .foreign_keys(true);

        let pool_options = if url == "sqlite::memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        debug!(url = %url, "sqlite pool opened");
        Ok(Self { pool })
    }

    pub fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn memory_connection_strings() {
        assert_eq!(database_url(":memory:"), "sqlite::memory:");
        assert_eq!(database_url(""), "sqlite::memory:");
    }

    #[test]
    fn urls_pass_through_and_paths_are_created() {
        assert_eq!(database_url("sqlite:data.db"), "sqlite:data.db");
        assert_eq!(database_url("snapshots.db"), "sqlite://snapshots.db?mode=rwc");
    }

    #[tokio::test]
    async fn connect_runs_migrations_in_memory() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        store.run_migrations().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master
             WHERE type = 'table'
               AND name IN ('calculation_cache', 'calculation_snapshots', 'snapshot_stale_marks')
             ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["calculation_cache", "calculation_snapshots", "snapshot_stale_marks"]
        );
    }
}
