use std::path::PathBuf;

use rust_decimal::Decimal;
use tax_core::{ArithmeticError, CalcError};
use thiserror::Error;

/// Errors that can occur when loading tax parameter data.
#[derive(Debug, Error)]
pub enum TaxDataError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("TOML parse error in {file}: {message}")]
    TomlParse { file: String, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("{tax_year} schedule {schedule}: {message}")]
    BracketLayout {
        tax_year: i32,
        schedule: String,
        message: String,
    },

    #[error(
        "{tax_year} schedule {schedule}: base tax at {min_income} should be {expected}, file says {found}"
    )]
    BaseTaxMismatch {
        tax_year: i32,
        schedule: String,
        min_income: Decimal,
        expected: Decimal,
        found: Decimal,
    },

    #[error("No bracket schedules for tax year {0} (is federal_brackets.csv complete?)")]
    MissingBrackets(i32),

    #[error("{file} is for tax year {found}, expected {expected}")]
    YearMismatch {
        file: String,
        expected: i32,
        found: i32,
    },

    #[error(transparent)]
    Config(#[from] CalcError),
}

impl From<csv::Error> for TaxDataError {
    fn from(err: csv::Error) -> Self {
        TaxDataError::CsvParse(err.to_string())
    }
}

impl From<ArithmeticError> for TaxDataError {
    fn from(err: ArithmeticError) -> Self {
        TaxDataError::Config(err.into())
    }
}

impl TaxDataError {
    pub(crate) fn toml(
        file: &str,
        err: toml::de::Error,
    ) -> Self {
        TaxDataError::TomlParse {
            file: file.to_string(),
            message: err.to_string(),
        }
    }
}
