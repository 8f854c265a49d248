//! Line-by-line worksheets used by the federal engine.

pub mod self_emp;

pub use self_emp::{SeWorksheet, SeWorksheetResult};
