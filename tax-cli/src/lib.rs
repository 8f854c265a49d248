//! Wiring shared by the `tax-calc` binary: application config, pipeline
//! construction and logging.

pub mod app;
pub mod logging;
