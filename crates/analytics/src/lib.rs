//! Quarter analytics for the holdings pipeline.
//!
//! This crate handles:
//! - Unit multiplier inference (dollars vs thousands of dollars)
//! - Dollar normalization and portfolio weights
//! - Sanity validation of a normalized quarter
//! - Per-security aggregation, ranking and quarter-over-quarter deltas

pub mod aggregator;
pub mod normalizer;
pub mod stats;
pub mod unit_resolver;
pub mod validator;

pub use aggregator::aggregate;
pub use normalizer::{normalize, NormalizedQuarter};
pub use unit_resolver::{CandidateCheck, UnitResolution, UnitResolver};
pub use validator::{ValidationInput, Validator};
