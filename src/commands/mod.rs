//! Command implementations for the CLI
//!
//! - start: Start the exporter
//! - test: Check settings and catalog
//! - config: Settings and catalog display and validation

pub mod config;
pub mod start;
