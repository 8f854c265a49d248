//! Tax calculation modules.
//!
//! The decimal kernel ([`common`], [`brackets`]) is pure and synchronous;
//! the federal engine and the state calculators build on it.

pub mod brackets;
pub mod common;
pub mod federal;
pub mod state;
pub mod worksheets;

pub use federal::FederalTaxEngine;
pub use state::{StateCalculator, StateRegistry, StateRegistryBuilder};
pub use worksheets::{SeWorksheet, SeWorksheetResult};
