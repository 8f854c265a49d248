use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::cache::CalculationCache;
use super::memory::{MemoryCalculationCache, MemorySnapshotStore};
use super::repository::{SnapshotStore, StoreError};

/// Backend-agnostic connection configuration.
///
/// `backend` must match the [`BackendFactory::backend_name`] of a
/// registered factory.  `connection_string` is passed through to that
/// factory unchanged; its meaning is backend-specific.
///
/// | backend    | connection_string examples          |
/// |------------|-------------------------------------|
/// | `memory`   | ignored                             |
/// | `sqlite`   | `snapshots.db`, `:memory:`          |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Lowercase identifier matching a registered factory (e.g. `"sqlite"`).
    pub backend: String,
    /// Opaque value forwarded to the factory's `create` method.
    pub connection_string: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            connection_string: String::new(),
        }
    }
}

/// The two mutable shared resources a pipeline needs.
#[derive(Clone)]
pub struct Backend {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub cache: Arc<dyn CalculationCache>,
}

impl Backend {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        cache: Arc<dyn CalculationCache>,
    ) -> Self {
        Self { snapshots, cache }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(MemoryCalculationCache::new()),
        )
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// One implementation per storage backend.  Each backend crate exports a
/// unit struct that implements this trait and is registered with a
/// [`BackendRegistry`] at startup.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Unique, lowercase identifier for this backend.
    fn backend_name(&self) -> &'static str;

    /// Open (or create) the backend. Implementations may run migrations
    /// or warm connection pools here.
    async fn create(&self, config: &DbConfig) -> Result<Backend, StoreError>;
}

/// [`BackendFactory`] for the process-local `"memory"` backend.
pub struct MemoryBackendFactory;

#[async_trait]
impl BackendFactory for MemoryBackendFactory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, _config: &DbConfig) -> Result<Backend, StoreError> {
        Ok(Backend::in_memory())
    }
}

/// Registry of [`BackendFactory`] instances, keyed by backend name.
pub struct BackendRegistry {
    factories: HashMap<&'static str, Box<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry that already knows the `"memory"` backend.
    pub fn with_memory() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(MemoryBackendFactory));
        registry
    }

    /// Register a backend factory, replacing any with the same name.
    pub fn register(&mut self, factory: Box<dyn BackendFactory>) {
        self.factories.insert(factory.backend_name(), factory);
    }

    /// Names of every registered backend, sorted alphabetically.
    pub fn available_backends(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// # Errors
    /// * [`StoreError::Configuration`] when no factory is registered for
    ///   the requested backend name.
    /// * Any error the chosen factory itself returns.
    pub async fn create(&self, config: &DbConfig) -> Result<Backend, StoreError> {
        let factory = self
            .factories
            .get(config.backend.as_str())
            .ok_or_else(|| {
                StoreError::Configuration(format!(
                    "unknown backend '{}'; available: {:?}",
                    config.backend,
                    self.available_backends()
                ))
            })?;

        factory.create(config).await
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
