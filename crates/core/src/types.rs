//! Core data types for the holdings pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::quarter::Quarter;

/// Form type of an original quarterly holdings report.
pub const FORM_HOLDINGS_REPORT: &str = "13F-HR";

/// Form type of an amendment to a quarterly holdings report.
pub const FORM_HOLDINGS_AMENDMENT: &str = "13F-HR/A";

/// Round to two decimal places (cents, or hundredths of a percent).
#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Options position marker on a holding line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PutCall {
    Put,
    Call,
}

impl PutCall {
    /// Parse the filing's `putCall` text. Blank or unknown text means no option.
    pub fn parse_optional(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "PUT" => Some(PutCall::Put),
            "CALL" => Some(PutCall::Call),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PutCall::Put => "PUT",
            PutCall::Call => "CALL",
        }
    }
}

/// Reconciliation key for a holding line within a quarter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub cusip: String,
    pub put_call: Option<PutCall>,
}

/// Filing-level metadata as listed by the filing index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingMetadata {
    /// Accession identifier, dashes removed.
    pub accession_number: String,
    /// `13F-HR` or `13F-HR/A`.
    pub form_type: String,
    /// Date the filing was submitted.
    pub filing_date: NaiveDate,
    /// Period-of-report date.
    pub period_of_report: NaiveDate,
    /// Declared amendment type (`RESTATEMENT`, `NEW HOLDINGS`), if known.
    pub amendment_type: Option<String>,
    /// Primary document file name.
    pub primary_document: String,
}

impl FilingMetadata {
    /// Is this an original (non-amendment) report?
    pub fn is_base(&self) -> bool {
        self.form_type == FORM_HOLDINGS_REPORT
    }

    /// Is this an amendment?
    pub fn is_amendment(&self) -> bool {
        self.form_type == FORM_HOLDINGS_AMENDMENT
    }

    /// Reporting quarter of this filing.
    pub fn quarter(&self) -> Quarter {
        Quarter::from_date(self.period_of_report)
    }
}

/// One holding line of a filing, exactly as reported.
///
/// Unique per (accession_number, row_index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHoldingRecord {
    pub accession_number: String,
    /// Reporting-entity identifier (CIK).
    pub cik: String,
    pub period_of_report: NaiveDate,
    pub filed_date: NaiveDate,
    pub form_type: String,
    pub amendment_type: Option<String>,
    pub issuer_name: String,
    pub cusip: String,
    /// Reported value; dollars or thousands of dollars depending on the filing.
    pub value_raw: i64,
    /// Share or principal amount.
    pub shares: i64,
    /// `SH` or `PRN`.
    pub share_type: String,
    pub put_call: Option<PutCall>,
    pub investment_discretion: String,
    /// Position of the line within its filing.
    pub row_index: usize,
}

impl RawHoldingRecord {
    /// Key used to reconcile amendment lines against earlier lines.
    pub fn merge_key(&self) -> MergeKey {
        MergeKey {
            cusip: self.cusip.clone(),
            put_call: self.put_call,
        }
    }
}

/// A raw line that survived amendment reconciliation for its quarter.
pub type MergedQuarterRecord = RawHoldingRecord;

/// Why a unit multiplier was chosen for a quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitReason {
    DefaultThousandsNoData,
    DefaultThousandsNoShares,
    ThousandsByTotalAndImpliedPrice,
    DollarsByTotalAndImpliedPriceWarn,
    ThousandsPreferredWhenBothPass,
    FailBothCandidatesUsingThousands,
    DollarsFallback,
}

impl UnitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitReason::DefaultThousandsNoData => "default_thousands_no_data",
            UnitReason::DefaultThousandsNoShares => "default_thousands_no_shares",
            UnitReason::ThousandsByTotalAndImpliedPrice => "thousands_by_total_and_implied_price",
            UnitReason::DollarsByTotalAndImpliedPriceWarn => "dollars_by_total_and_implied_price_warn",
            UnitReason::ThousandsPreferredWhenBothPass => "thousands_preferred_when_both_pass",
            UnitReason::FailBothCandidatesUsingThousands => "fail_both_candidates_using_thousands",
            UnitReason::DollarsFallback => "dollars_fallback",
        }
    }

    /// Reasons that deserve an operator's attention.
    pub fn is_warning(self) -> bool {
        matches!(
            self,
            UnitReason::DollarsByTotalAndImpliedPriceWarn
                | UnitReason::FailBothCandidatesUsingThousands
                | UnitReason::DollarsFallback
        )
    }
}

impl fmt::Display for UnitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| Error::data(format!("unknown unit reason '{s}'")))
    }
}

/// A merged line with dollar value and portfolio weight attached.
///
/// Primary key: (quarter, cusip, put_call).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedHoldingRecord {
    pub quarter: Quarter,
    pub accession_number: String,
    pub cusip: String,
    pub put_call: Option<PutCall>,
    pub issuer_name: String,
    pub value_raw: i64,
    pub shares: i64,
    pub share_type: String,
    pub investment_discretion: String,
    pub unit_multiplier: u32,
    pub unit_reason: UnitReason,
    /// Dollar value, rounded to cents.
    pub value_usd: f64,
    /// Sum of `value_usd` over the quarter.
    pub total_value_usd_q: f64,
    /// Share of the quarter total, in percent, 2 decimals.
    pub weight_pct: f64,
    pub ticker: Option<String>,
}

/// Quarter-over-quarter change label.
///
/// Holdings that disappear from one quarter to the next are not materialized,
/// so there is no "closed" label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    New,
    Increased,
    Decreased,
    Unchanged,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::New => "NEW",
            ChangeType::Increased => "INCREASED",
            ChangeType::Decreased => "DECREASED",
            ChangeType::Unchanged => "UNCHANGED",
        }
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ChangeType::New),
            "INCREASED" => Ok(ChangeType::Increased),
            "DECREASED" => Ok(ChangeType::Decreased),
            "UNCHANGED" => Ok(ChangeType::Unchanged),
            other => Err(Error::data(format!("unknown change type '{other}'"))),
        }
    }
}

/// One row per (quarter, cusip), ranked by value with deltas to the previous quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedHoldingRecord {
    pub quarter: Quarter,
    pub cusip: String,
    pub issuer_name: String,
    pub ticker: Option<String>,
    pub value_usd: f64,
    pub shares: i64,
    pub weight_pct: f64,
    /// 1 = largest value.
    pub rank: u32,
    pub prev_quarter: Option<Quarter>,
    pub prev_value_usd: Option<f64>,
    pub prev_weight_pct: Option<f64>,
    pub delta_value_usd: Option<f64>,
    pub delta_weight_pct: Option<f64>,
    pub change_type: ChangeType,
}

/// Outcome of a validation check, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Warn,
    Fail,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Pass => "PASS",
            ValidationStatus::Warn => "WARN",
            ValidationStatus::Fail => "FAIL",
        }
    }

    /// Stored quarters with this status are not reprocessed unless forced.
    pub fn is_settled(self) -> bool {
        matches!(self, ValidationStatus::Pass | ValidationStatus::Warn)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(ValidationStatus::Pass),
            "WARN" => Ok(ValidationStatus::Warn),
            "FAIL" => Ok(ValidationStatus::Fail),
            other => Err(Error::data(format!("unknown validation status '{other}'"))),
        }
    }
}

/// Diagnostic for one validation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub result: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<usize>,
}

/// Overall status plus one diagnostic per check, keyed by check name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub checks: BTreeMap<String, CheckResult>,
}

/// Per-quarter audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterMeta {
    pub quarter: Quarter,
    pub used_accessions: Vec<String>,
    pub amendment_types: Vec<String>,
    pub unit_multiplier: u32,
    pub unit_reason: UnitReason,
    pub total_value_usd: f64,
    /// Should be close to 100.
    pub weight_sum_pct: f64,
    pub implied_price_median: f64,
    pub num_holdings: usize,
    pub validation_status: ValidationStatus,
    pub validation_details: BTreeMap<String, CheckResult>,
    pub sec_filing_urls: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

/// Everything computed for one quarter, handed to sinks as a unit.
#[derive(Debug, Clone)]
pub struct QuarterDataset {
    pub quarter: Quarter,
    pub merged: Vec<MergedQuarterRecord>,
    pub normalized: Vec<NormalizedHoldingRecord>,
    pub aggregated: Vec<AggregatedHoldingRecord>,
    pub meta: QuarterMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005_f64 * 1000.0), 1005.0);
        assert!((round2(33.333333) - 33.33).abs() < 1e-10);
        assert!((round2(-0.126) + 0.13).abs() < 1e-10);
    }

    #[test]
    fn test_put_call_parsing() {
        assert_eq!(PutCall::parse_optional("Put"), Some(PutCall::Put));
        assert_eq!(PutCall::parse_optional(" CALL "), Some(PutCall::Call));
        assert_eq!(PutCall::parse_optional(""), None);
        assert_eq!(PutCall::parse_optional("   "), None);
    }

    #[test]
    fn test_status_severity_order() {
        assert!(ValidationStatus::Fail > ValidationStatus::Warn);
        assert!(ValidationStatus::Warn > ValidationStatus::Pass);
        assert_eq!(
            [ValidationStatus::Pass, ValidationStatus::Fail, ValidationStatus::Warn]
                .into_iter()
                .max(),
            Some(ValidationStatus::Fail)
        );
        assert!(ValidationStatus::Warn.is_settled());
        assert!(!ValidationStatus::Fail.is_settled());
    }

    #[test]
    fn test_unit_reason_round_trips_through_str() {
        let reason: UnitReason = "thousands_preferred_when_both_pass".parse().unwrap();
        assert_eq!(reason, UnitReason::ThousandsPreferredWhenBothPass);
        assert_eq!(reason.to_string(), "thousands_preferred_when_both_pass");
        assert!(UnitReason::DollarsFallback.is_warning());
        assert!(!UnitReason::ThousandsByTotalAndImpliedPrice.is_warning());
    }

    #[test]
    fn test_check_result_skips_empty_fields() {
        let check = CheckResult {
            result: ValidationStatus::Pass,
            expected: Some([99.5, 100.5]),
            expected_min: None,
            actual: Some(100.0),
            missing: None,
        };
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["result"], "PASS");
        assert!(json.get("missing").is_none());
    }
}
