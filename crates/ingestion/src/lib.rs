//! Filing ingestion for the holdings pipeline.
//!
//! This crate handles:
//! - Fetching filing listings and information tables (rate limited, retried)
//! - Parsing information-table XML into raw holding lines
//! - Reconciling a base filing with its amendments

pub mod fetcher;
pub mod merger;
pub mod parser;
pub mod retry;

pub use fetcher::{EdgarClient, FilingSource};
pub use merger::{Amendment, AmendmentMerger, MergeAction, MergeOutcome};
pub use parser::InfoTableParser;
pub use retry::{RateLimiter, RetryPolicy};
