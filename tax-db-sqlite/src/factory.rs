use std::sync::Arc;

use async_trait::async_trait;
use tax_core::{Backend, BackendFactory, DbConfig, StoreError};
use tracing::info;

use crate::SqliteStore;

/// [`BackendFactory`] for SQLite.
///
/// Register this with a [`tax_core::BackendRegistry`] to make the
/// `"sqlite"` backend available:
///
/// ```rust,no_run
/// use tax_core::BackendRegistry;
/// use tax_db_sqlite::SqliteBackendFactory;
///
/// let mut registry = BackendRegistry::with_memory();
/// registry.register(Box::new(SqliteBackendFactory));
/// ```
pub struct SqliteBackendFactory;

#[async_trait]
impl BackendFactory for SqliteBackendFactory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    /// Open the database described by `config.connection_string`, run
    /// migrations and drop expired cache rows.
    ///
    /// Accepted connection-string values:
    /// * A bare file path, e.g. `"snapshots.db"`. Created if missing.
    /// * `":memory:"`, an ephemeral in-memory database.
    /// * A sqlx URL starting with `sqlite:`.
    async fn create(&self, config: &DbConfig) -> Result<Backend, StoreError> {
        let store = SqliteStore::connect(&config.connection_string).await?;
        store.run_migrations().await?;
        let purged = store.purge_expired().await?;
        info!(
            connection = %config.connection_string,
            purged,
            "sqlite backend ready"
        );

        let store = Arc::new(store);
        Ok(Backend::new(store.clone(), store))
    }
}
