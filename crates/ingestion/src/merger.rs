//! Amendment reconciliation.
//!
//! Folds a quarter's amendments, in filing order, over the base filing's lines.
//! A full replacement discards the working set and its audit trail; an
//! incremental amendment overrides lines by merge key and appends the rest.

use holdings_core::{MergeKey, MergedQuarterRecord, RawHoldingRecord, FORM_HOLDINGS_REPORT};
use std::collections::HashSet;
use tracing::{debug, info};

/// Declared amendment type that always supersedes the quarter.
pub const RESTATEMENT: &str = "RESTATEMENT";

/// Declared amendment type for added or corrected lines.
pub const NEW_HOLDINGS: &str = "NEW HOLDINGS";

/// Audit label for a full replacement with no declared type.
pub const FULL_REPLACE: &str = "FULL_REPLACE";

/// One amendment filing and its parsed lines.
#[derive(Debug, Clone)]
pub struct Amendment {
    pub accession_number: String,
    pub amendment_type: Option<String>,
    pub records: Vec<RawHoldingRecord>,
}

/// How an amendment is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Replace the working set and audit trail.
    FullReplace,
    /// Override colliding merge keys and append.
    Incremental,
}

/// Reconciled lines plus the filings that contributed to them.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub records: Vec<MergedQuarterRecord>,
    pub used_accessions: Vec<String>,
    pub amendment_types: Vec<String>,
}

/// Merger for base filings and their amendments.
pub struct AmendmentMerger {
    /// Row count at which an untyped or NEW HOLDINGS amendment replaces everything.
    full_replace_min_rows: usize,
}

impl AmendmentMerger {
    /// Create a new merger.
    pub fn new(full_replace_min_rows: usize) -> Self {
        Self {
            full_replace_min_rows,
        }
    }

    /// Decide how an amendment applies.
    pub fn classify(&self, amendment: &Amendment) -> MergeAction {
        let declared = declared_type(amendment);
        let large = amendment.records.len() >= self.full_replace_min_rows;
        match declared.as_deref() {
            Some(RESTATEMENT) => MergeAction::FullReplace,
            Some(NEW_HOLDINGS) | None if large => MergeAction::FullReplace,
            _ => MergeAction::Incremental,
        }
    }

    /// Merge the base lines with the amendments, which must be in filing order.
    pub fn merge(
        &self,
        base_accession: &str,
        base: Vec<RawHoldingRecord>,
        amendments: Vec<Amendment>,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome {
            records: base,
            used_accessions: vec![base_accession.to_string()],
            amendment_types: vec![FORM_HOLDINGS_REPORT.to_string()],
        };

        for amendment in amendments {
            if amendment.records.is_empty() {
                debug!(accession = %amendment.accession_number, "skipping empty amendment");
                continue;
            }
            let declared = declared_type(&amendment);

            match self.classify(&amendment) {
                MergeAction::FullReplace => {
                    info!(
                        accession = %amendment.accession_number,
                        rows = amendment.records.len(),
                        "amendment replaces quarter"
                    );
                    outcome.records = amendment.records;
                    outcome.used_accessions = vec![amendment.accession_number];
                    outcome.amendment_types =
                        vec![declared.unwrap_or_else(|| FULL_REPLACE.to_string())];
                }
                MergeAction::Incremental => {
                    let keys: HashSet<MergeKey> =
                        amendment.records.iter().map(RawHoldingRecord::merge_key).collect();
                    let before = outcome.records.len();
                    outcome.records.retain(|r| !keys.contains(&r.merge_key()));
                    debug!(
                        accession = %amendment.accession_number,
                        replaced = before - outcome.records.len(),
                        appended = amendment.records.len(),
                        "applying incremental amendment"
                    );
                    outcome.records.extend(amendment.records);
                    outcome.used_accessions.push(amendment.accession_number);
                    outcome
                        .amendment_types
                        .push(declared.unwrap_or_else(|| NEW_HOLDINGS.to_string()));
                }
            }
        }

        outcome
    }
}

/// Trimmed, upper-cased declared type; blank counts as undeclared.
fn declared_type(amendment: &Amendment) -> Option<String> {
    amendment
        .amendment_type
        .as_deref()
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use holdings_core::PutCall;

    fn record(accession: &str, cusip: &str, put_call: Option<PutCall>, value: i64) -> RawHoldingRecord {
        let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        RawHoldingRecord {
            accession_number: accession.to_string(),
            cik: "0001067983".to_string(),
            period_of_report: date,
            filed_date: date,
            form_type: "13F-HR".to_string(),
            amendment_type: None,
            issuer_name: format!("Issuer {cusip}"),
            cusip: cusip.to_string(),
            value_raw: value,
            shares: 10,
            share_type: "SH".to_string(),
            put_call,
            investment_discretion: "SOLE".to_string(),
            row_index: 0,
        }
    }

    fn amendment(accession: &str, kind: Option<&str>, records: Vec<RawHoldingRecord>) -> Amendment {
        Amendment {
            accession_number: accession.to_string(),
            amendment_type: kind.map(str::to_string),
            records,
        }
    }

    fn value_of(outcome: &MergeOutcome, cusip: &str) -> Option<i64> {
        outcome.records.iter().find(|r| r.cusip == cusip).map(|r| r.value_raw)
    }

    #[test]
    fn test_base_only() {
        let merger = AmendmentMerger::new(20);
        let base = vec![record("acc-001", "A", None, 100), record("acc-001", "B", None, 200)];
        let outcome = merger.merge("acc-001", base, vec![]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.used_accessions, vec!["acc-001"]);
        assert_eq!(outcome.amendment_types, vec!["13F-HR"]);
    }

    #[test]
    fn test_restatement_replaces_everything() {
        let merger = AmendmentMerger::new(20);
        let base = vec![record("acc-001", "A", None, 100)];
        let restated = vec![record("acc-002", "X", None, 50), record("acc-002", "Y", None, 50)];
        let outcome = merger.merge(
            "acc-001",
            base,
            vec![amendment("acc-002", Some("RESTATEMENT"), restated.clone())],
        );
        assert_eq!(outcome.records, restated);
        assert_eq!(outcome.used_accessions, vec!["acc-002"]);
        assert_eq!(outcome.amendment_types, vec!["RESTATEMENT"]);
    }

    #[test]
    fn test_incremental_overrides_and_appends() {
        let merger = AmendmentMerger::new(20);
        let base = vec![record("acc-001", "A", None, 100), record("acc-001", "B", None, 200)];
        let amend = vec![record("acc-002", "A", None, 150), record("acc-002", "C", None, 50)];
        let outcome = merger.merge(
            "acc-001",
            base,
            vec![amendment("acc-002", Some("NEW HOLDINGS"), amend)],
        );
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(value_of(&outcome, "A"), Some(150));
        assert_eq!(value_of(&outcome, "B"), Some(200));
        assert_eq!(value_of(&outcome, "C"), Some(50));
        assert_eq!(outcome.used_accessions, vec!["acc-001", "acc-002"]);
        assert_eq!(outcome.amendment_types, vec!["13F-HR", "NEW HOLDINGS"]);
    }

    #[test]
    fn test_put_call_is_part_of_merge_key() {
        let merger = AmendmentMerger::new(20);
        let base = vec![record("acc-001", "A", None, 100), record("acc-001", "A", Some(PutCall::Put), 7)];
        let amend = vec![record("acc-002", "A", Some(PutCall::Put), 9)];
        let outcome = merger.merge("acc-001", base, vec![amendment("acc-002", None, amend)]);
        assert_eq!(outcome.records.len(), 2);
        let equity = outcome.records.iter().find(|r| r.put_call.is_none()).unwrap();
        let put = outcome.records.iter().find(|r| r.put_call.is_some()).unwrap();
        assert_eq!(equity.value_raw, 100);
        assert_eq!(put.value_raw, 9);
        assert_eq!(outcome.amendment_types, vec!["13F-HR", "NEW HOLDINGS"]);
    }

    #[test]
    fn test_large_untyped_amendment_is_full_replace() {
        let merger = AmendmentMerger::new(20);
        let base = vec![record("acc-001", "A", None, 100)];
        let big: Vec<_> = (0..20).map(|i| record("acc-002", &format!("Z{i}"), None, 1)).collect();
        let outcome = merger.merge("acc-001", base, vec![amendment("acc-002", Some("  "), big)]);
        assert_eq!(outcome.records.len(), 20);
        assert_eq!(value_of(&outcome, "A"), None);
        assert_eq!(outcome.used_accessions, vec!["acc-002"]);
        assert_eq!(outcome.amendment_types, vec!["FULL_REPLACE"]);
    }

    #[test]
    fn test_restatement_then_incremental_keeps_only_later_history() {
        let merger = AmendmentMerger::new(20);
        let base = vec![record("acc-001", "A", None, 100)];
        let outcome = merger.merge(
            "acc-001",
            base,
            vec![
                amendment("acc-002", Some("restatement"), vec![record("acc-002", "B", None, 5)]),
                amendment("acc-003", Some("NEW HOLDINGS"), vec![record("acc-003", "C", None, 6)]),
            ],
        );
        assert_eq!(outcome.used_accessions, vec!["acc-002", "acc-003"]);
        assert_eq!(outcome.amendment_types, vec!["RESTATEMENT", "NEW HOLDINGS"]);
        assert_eq!(value_of(&outcome, "A"), None);
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_empty_amendment_ignored() {
        let merger = AmendmentMerger::new(20);
        let base = vec![record("acc-001", "A", None, 100)];
        let outcome = merger.merge("acc-001", base, vec![amendment("acc-002", Some("RESTATEMENT"), vec![])]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.used_accessions, vec!["acc-001"]);
    }

    #[test]
    fn test_unknown_type_is_incremental() {
        let merger = AmendmentMerger::new(2);
        let a = amendment("x", Some("OTHER"), vec![record("x", "A", None, 1); 3]);
        assert_eq!(merger.classify(&a), MergeAction::Incremental);
        let b = amendment("x", Some("new holdings"), vec![record("x", "A", None, 1); 2]);
        assert_eq!(merger.classify(&b), MergeAction::FullReplace);
    }
}
