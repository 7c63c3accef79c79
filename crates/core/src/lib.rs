//! Core types and configuration for the holdings pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Holding record layers (raw, merged, normalized, aggregated)
//! - Reporting quarters and per-quarter audit metadata
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod quarter;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use quarter::Quarter;
pub use types::*;
