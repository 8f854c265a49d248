//! Tax parameter data for the calculation engine.
//!
//! Each tax year lives in its own directory:
//!
//! ```text
//! data/
//!   2025/
//!     federal.toml          federal parameters except ordinary brackets
//!     federal_brackets.csv  IRS schedules X, Y-1, Y-2 and Z
//!     states.toml           [[state]] configurations
//! ```
//!
//! The 2025 data set is also compiled into the crate ([`TaxDataSet::embedded`]).

mod brackets;
mod error;
mod federal;
mod states;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tax_core::{
    CalcError, FederalParameterSet, FederalTaxEngine, FederalTaxParameters, StateRegistry,
    StateTaxConfig,
};
use tracing::{debug, info};

pub use brackets::{BracketScheduleLoader, TaxBracketRecord};
pub use error::TaxDataError;
pub use federal::parse_federal;
pub use states::parse_states;

pub const FEDERAL_FILE: &str = "federal.toml";
pub const BRACKETS_FILE: &str = "federal_brackets.csv";
pub const STATES_FILE: &str = "states.toml";

/// The raw text of one tax year's data files.
#[derive(Debug, Clone, Copy)]
pub struct YearSources<'a> {
    pub federal: &'a str,
    pub brackets: &'a str,
    pub states: &'a str,
}

pub const EMBEDDED_2025: YearSources<'static> = YearSources {
    federal: include_str!("../data/2025/federal.toml"),
    brackets: include_str!("../data/2025/federal_brackets.csv"),
    states: include_str!("../data/2025/states.toml"),
};

/// Parsed and validated data for one tax year.
#[derive(Debug, Clone)]
pub struct YearData {
    pub federal: FederalTaxParameters,
    pub states: Vec<StateTaxConfig>,
}

impl YearData {
    /// Parses one year's files and checks that they agree on the year.
    pub fn parse(sources: YearSources<'_>) -> Result<Self, TaxDataError> {
        let records = BracketScheduleLoader::parse(sources.brackets.as_bytes())?;
        let schedules = BracketScheduleLoader::build(&records)?;
        let federal = parse_federal(FEDERAL_FILE, sources.federal, &schedules)?;

        if let Some(&other) = schedules.keys().find(|&&year| year != federal.tax_year) {
            return Err(TaxDataError::YearMismatch {
                file: BRACKETS_FILE.to_string(),
                expected: federal.tax_year,
                found: other,
            });
        }

        let states = parse_states(STATES_FILE, sources.states)?;
        if let Some(state) = states.iter().find(|s| s.tax_year != federal.tax_year) {
            return Err(TaxDataError::YearMismatch {
                file: format!("{STATES_FILE} ({})", state.state_code),
                expected: federal.tax_year,
                found: state.tax_year,
            });
        }

        debug!(
            tax_year = federal.tax_year,
            brackets = records.len(),
            states = states.len(),
            "parsed tax year data"
        );
        Ok(Self { federal, states })
    }
}

fn read(path: PathBuf) -> Result<String, TaxDataError> {
    fs::read_to_string(&path).map_err(|source| TaxDataError::Io { path, source })
}

/// Federal parameters and state calculators for every loaded year, frozen
/// behind `Arc` for sharing across tasks.
#[derive(Debug, Clone)]
pub struct TaxDataSet {
    federal: Arc<FederalParameterSet>,
    states: Arc<StateRegistry>,
}

impl TaxDataSet {
    pub fn from_years(years: impl IntoIterator<Item = YearData>) -> Result<Self, TaxDataError> {
        let mut federal = FederalParameterSet::new();
        let mut registry = StateRegistry::builder();
        for year in years {
            if federal.years().contains(&year.federal.tax_year) {
                return Err(TaxDataError::Config(CalcError::Configuration(format!(
                    "federal parameters for {} loaded twice",
                    year.federal.tax_year
                ))));
            }
            federal.insert(year.federal)?;
            registry.register_all(year.states)?;
        }

        let data = Self {
            federal: Arc::new(federal),
            states: Arc::new(registry.build()),
        };
        info!(
            years = ?data.years(),
            jurisdictions = data.states.len(),
            "tax data loaded"
        );
        Ok(data)
    }

    /// The 2025 data compiled into this crate.
    pub fn embedded() -> Result<Self, TaxDataError> {
        Self::from_years([YearData::parse(EMBEDDED_2025)?])
    }

    /// Loads every `<year>/` directory under `dir`.
    ///
    /// Directories whose names are not years are skipped. `states.toml` is
    /// optional; the two federal files are not.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, TaxDataError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| TaxDataError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut year_dirs = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| TaxDataError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let year = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.parse::<i32>().ok());
            match year {
                Some(year) if path.is_dir() => {
                    year_dirs.insert(year, path);
                }
                _ => debug!(path = %path.display(), "skipping non-year entry"),
            }
        }

        if year_dirs.is_empty() {
            return Err(TaxDataError::Config(CalcError::Configuration(format!(
                "no tax year directories under {}",
                dir.display()
            ))));
        }

        let mut years = Vec::with_capacity(year_dirs.len());
        for (year, path) in year_dirs {
            let federal = read(path.join(FEDERAL_FILE))?;
            let brackets = read(path.join(BRACKETS_FILE))?;
            let states_path = path.join(STATES_FILE);
            let states = if states_path.exists() {
                read(states_path)?
            } else {
                String::new()
            };

            let data = YearData::parse(YearSources {
                federal: &federal,
                brackets: &brackets,
                states: &states,
            })?;
            if data.federal.tax_year != year {
                return Err(TaxDataError::YearMismatch {
                    file: path.join(FEDERAL_FILE).display().to_string(),
                    expected: year,
                    found: data.federal.tax_year,
                });
            }
            years.push(data);
        }

        Self::from_years(years)
    }

    pub fn years(&self) -> Vec<i32> {
        self.federal.years()
    }

    pub fn federal_parameters(&self) -> Arc<FederalParameterSet> {
        Arc::clone(&self.federal)
    }

    pub fn federal_engine(&self) -> FederalTaxEngine {
        FederalTaxEngine::new(self.federal_parameters())
    }

    pub fn state_registry(&self) -> Arc<StateRegistry> {
        Arc::clone(&self.states)
    }
}
