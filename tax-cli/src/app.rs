//! Application configuration and wiring for the `tax-calc` binary.
//!
//! ```toml
//! [storage]
//! backend = "sqlite"
//! connection_string = "snapshots.db"
//!
//! [cache]
//! ttl_seconds = 3600
//!
//! [pipeline]
//! io_timeout_ms = 2000
//!
//! [logging]
//! level = "info"
//! file = "tax-calc.log"
//!
//! [data]
//! dir = "tax-data/data"
//! ```
//!
//! Every section and key is optional.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tax_core::{BackendRegistry, CalculationPipeline, DbConfig, PipelineConfig, TaxReturn};
use tax_data::TaxDataSet;
use tax_db_sqlite::SqliteBackendFactory;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineSection,
    pub logging: LoggingConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: String,
    pub connection_string: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db = DbConfig::default();
        Self {
            backend: db.backend,
            connection_string: db.connection_string,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: PipelineConfig::default().cache_ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub io_timeout_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            io_timeout_ms: PipelineConfig::default().io_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Directory of `<year>/` data folders. The embedded data set is used
    /// when unset.
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config '{}'", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.storage.backend.trim().is_empty() {
            bail!("storage.backend must not be empty");
        }
        if self.cache.ttl_seconds == 0 {
            bail!("cache.ttl_seconds must be positive");
        }
        if self.pipeline.io_timeout_ms == 0 {
            bail!("pipeline.io_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            backend: self.storage.backend.to_lowercase(),
            connection_string: self.storage.connection_string.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            cache_ttl: Duration::from_secs(self.cache.ttl_seconds),
            io_timeout: Duration::from_millis(self.pipeline.io_timeout_ms),
        }
    }
}

/// Every storage backend this binary can open.
pub fn build_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::with_memory();
    registry.register(Box::new(SqliteBackendFactory));
    registry
}

pub fn load_data(config: &AppConfig) -> Result<TaxDataSet> {
    match &config.data.dir {
        Some(dir) => TaxDataSet::load_dir(dir)
            .with_context(|| format!("cannot load tax data from '{}'", dir.display())),
        None => TaxDataSet::embedded().context("embedded tax data is invalid"),
    }
}

pub async fn build_pipeline(config: &AppConfig) -> Result<CalculationPipeline> {
    let data = load_data(config)?;
    let db_config = config.db_config();

    debug!(backend = %db_config.backend, "opening snapshot store");
    let backend = build_registry()
        .create(&db_config)
        .await
        .with_context(|| format!("cannot open '{}' backend", db_config.backend))?;

    info!(
        backend = %db_config.backend,
        years = ?data.years(),
        "pipeline ready"
    );
    Ok(
        CalculationPipeline::new(data.federal_engine(), data.state_registry(), backend)
            .with_config(config.pipeline_config()),
    )
}

/// Reads a JSON tax return from `path`, or from stdin when `path` is `None`
/// or `-`.
pub fn read_return(path: Option<&Path>) -> Result<TaxReturn> {
    let text = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read return '{}'", path.display()))?,
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("cannot read return from stdin")?;
            text
        }
    };
    parse_return(&text)
}

pub fn parse_return(text: &str) -> Result<TaxReturn> {
    serde_json::from_str(text).context("return is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use tax_core::{FilingStatusCode, ResultSource, StateCode};

    // =========================================================================
    // Config
    // =========================================================================

    #[test]
    fn empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.db_config(), DbConfig::default());
        assert_eq!(config.pipeline_config(), PipelineConfig::default());
        assert_eq!(config.data.dir, None);
    }

    #[test]
    fn full_config_parses() {
        let config = AppConfig::from_toml(
            r#"
[storage]
backend = "SQLite"
connection_string = "snapshots.db"

[cache]
ttl_seconds = 60

[pipeline]
io_timeout_ms = 250

[logging]
level = "debug"
file = "tax-calc.log"

[data]
dir = "tax-data/data"
"#,
        )
        .unwrap();

        assert_eq!(
            config.db_config(),
            DbConfig {
                backend: "sqlite".to_string(),
                connection_string: "snapshots.db".to_string(),
            }
        );
        assert_eq!(
            config.pipeline_config(),
            PipelineConfig {
                cache_ttl: Duration::from_secs(60),
                io_timeout: Duration::from_millis(250),
            }
        );
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.file, Some(PathBuf::from("tax-calc.log")));
        assert_eq!(config.data.dir, Some(PathBuf::from("tax-data/data")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::from_toml("[storage]\nbackned = \"sqlite\"").is_err());
        assert!(AppConfig::from_toml("[metrics]\nenabled = true").is_err());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = AppConfig::from_toml("[cache]\nttl_seconds = 0").unwrap_err();
        assert!(err.to_string().contains("ttl_seconds"), "{err}");

        let err = AppConfig::from_toml("[pipeline]\nio_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("io_timeout_ms"), "{err}");
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = AppConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();

        assert!(err.to_string().contains("cannot read config"), "{err}");
    }

    #[test]
    fn registry_offers_memory_and_sqlite() {
        let mut backends = build_registry().available_backends();
        backends.sort_unstable();

        assert_eq!(backends, vec!["memory", "sqlite"]);
    }

    // =========================================================================
    // Returns and pipeline
    // =========================================================================

    const RETURN: &str = r#"{
        "return_id": 11,
        "tax_year": 2025,
        "taxpayer": {
            "filing_status": "S",
            "residency": { "state": "IL" }
        },
        "income": { "wages": "85000" },
        "payments": { "federal_withholding": "16000" }
    }"#;

    #[test]
    fn parse_return_reads_json() {
        let tax_return = parse_return(RETURN).unwrap();

        assert_eq!(tax_return.return_id, 11);
        assert_eq!(tax_return.taxpayer.filing_status, FilingStatusCode::Single);
        assert_eq!(tax_return.income.wages, dec!(85000));
    }

    #[test]
    fn parse_return_rejects_garbage() {
        assert!(parse_return("{ not json").is_err());
    }

    #[tokio::test]
    async fn pipeline_from_default_config_calculates() {
        let pipeline = build_pipeline(&AppConfig::default()).await.unwrap();
        let tax_return = parse_return(RETURN).unwrap();
        let state = tax_return.taxpayer.residency.state;

        let outcome = pipeline.calculate(&tax_return, 2025, state).await.unwrap();

        assert_eq!(outcome.source, ResultSource::Computed);
        assert_eq!(outcome.result.federal.total_tax, dec!(10149.00));
        assert_eq!(
            outcome.result.state.map(|s| s.state_code),
            Some(StateCode::parse("IL").unwrap())
        );
    }

    #[tokio::test]
    async fn unknown_backend_fails_to_build() {
        let config = AppConfig::from_toml("[storage]\nbackend = \"postgres\"").unwrap();

        let err = build_pipeline(&config).await.err().unwrap();

        assert!(err.to_string().contains("postgres"), "{err}");
    }
}
