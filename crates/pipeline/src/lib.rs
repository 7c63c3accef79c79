//! Quarter pipeline for the holdings ledger.
//!
//! This crate handles:
//! - Orchestrating fetch, merge, unit resolution, normalization, validation and aggregation per quarter
//! - Persisting computed quarters (SQLite or in memory)
//! - Writing per-quarter CSV/JSON artifacts
//! - Raising operator alerts

pub mod alerts;
pub mod artifacts;
pub mod orchestrator;
pub mod sqlite;
pub mod store;

#[cfg(test)]
mod test_support;

pub use alerts::{AlertSink, LogAlertSink};
pub use artifacts::{ArtifactPaths, ArtifactWriter};
pub use orchestrator::{Pipeline, ProcessedQuarter, QuarterFailure, RunOptions, RunSummary};
pub use sqlite::SqliteStore;
pub use store::{HoldingsStore, InMemoryStore};
