//! Error taxonomy shared by the calculation engine and the pipeline.

use thiserror::Error;

/// Kernel-level arithmetic failures.
///
/// These indicate a logic bug in a rate formula or an absurd input and are
/// always surfaced to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Errors produced by a tax calculation request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalcError {
    /// Malformed or internally inconsistent input. Never retried.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// No calculator is registered for the requested state and year.
    #[error("unsupported jurisdiction {state} for tax year {tax_year}")]
    UnsupportedJurisdiction { state: String, tax_year: i32 },

    /// A tax parameter table is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Snapshot store or cache I/O failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

impl CalcError {
    pub fn validation(
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by the request itself (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::UnsupportedJurisdiction { .. }
        )
    }

    /// Message safe to show outside the process boundary.
    ///
    /// Client errors keep their detail; everything else collapses to an
    /// opaque message so internal state is not leaked.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "internal calculation error".to_string()
        }
    }
}
