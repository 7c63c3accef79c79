//! Persistence context for computed quarters.
//!
//! The orchestrator receives a store explicitly; each quarter is replaced as a
//! whole, never patched.

use holdings_core::{
    AggregatedHoldingRecord, NormalizedHoldingRecord, Quarter, QuarterDataset, QuarterMeta, Result,
    ValidationStatus,
};
use std::collections::BTreeMap;

/// Durable storage of normalized rows, aggregated rows and audit metadata.
pub trait HoldingsStore {
    /// Validation status of a stored quarter, if the quarter is stored.
    fn quarter_status(&self, quarter: Quarter) -> Result<Option<ValidationStatus>>;

    /// Aggregated rows of a quarter, ordered by rank. Empty when not stored.
    fn load_aggregate(&self, quarter: Quarter) -> Result<Vec<AggregatedHoldingRecord>>;

    /// Normalized rows of a quarter in insertion order.
    fn load_normalized(&self, quarter: Quarter) -> Result<Vec<NormalizedHoldingRecord>>;

    /// Audit metadata of a quarter.
    fn load_meta(&self, quarter: Quarter) -> Result<Option<QuarterMeta>>;

    /// All stored quarters, oldest first.
    fn stored_quarters(&self) -> Result<Vec<Quarter>>;

    /// Atomically replace everything stored for the dataset's quarter.
    fn replace_quarter(&mut self, dataset: &QuarterDataset) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredQuarter {
    normalized: Vec<NormalizedHoldingRecord>,
    aggregated: Vec<AggregatedHoldingRecord>,
    meta: QuarterMeta,
}

/// Process-local store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    quarters: BTreeMap<Quarter, StoredQuarter>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HoldingsStore for InMemoryStore {
    fn quarter_status(&self, quarter: Quarter) -> Result<Option<ValidationStatus>> {
        Ok(self.quarters.get(&quarter).map(|s| s.meta.validation_status))
    }

    fn load_aggregate(&self, quarter: Quarter) -> Result<Vec<AggregatedHoldingRecord>> {
        let mut rows = self
            .quarters
            .get(&quarter)
            .map(|s| s.aggregated.clone())
            .unwrap_or_default();
        rows.sort_by_key(|r| r.rank);
        Ok(rows)
    }

    fn load_normalized(&self, quarter: Quarter) -> Result<Vec<NormalizedHoldingRecord>> {
        Ok(self
            .quarters
            .get(&quarter)
            .map(|s| s.normalized.clone())
            .unwrap_or_default())
    }

    fn load_meta(&self, quarter: Quarter) -> Result<Option<QuarterMeta>> {
        Ok(self.quarters.get(&quarter).map(|s| s.meta.clone()))
    }

    fn stored_quarters(&self) -> Result<Vec<Quarter>> {
        Ok(self.quarters.keys().copied().collect())
    }

    fn replace_quarter(&mut self, dataset: &QuarterDataset) -> Result<()> {
        self.quarters.insert(
            dataset.quarter,
            StoredQuarter {
                normalized: dataset.normalized.clone(),
                aggregated: dataset.aggregated.clone(),
                meta: dataset.meta.clone(),
            },
        );
        Ok(())
    }
}
