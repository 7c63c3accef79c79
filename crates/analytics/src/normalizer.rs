//! Dollar normalization and portfolio weights.

use holdings_core::{round2, MergedQuarterRecord, NormalizedHoldingRecord, Quarter, UnitReason};

use crate::stats::implied_price_median;

/// A normalized quarter with its totals.
#[derive(Debug, Clone)]
pub struct NormalizedQuarter {
    pub quarter: Quarter,
    pub records: Vec<NormalizedHoldingRecord>,
    /// Sum of dollar values.
    pub total_value_usd: f64,
    /// Sum of weights; close to 100 unless rounding piles up.
    pub weight_sum_pct: f64,
}

impl NormalizedQuarter {
    /// Median dollar price per share over lines with positive shares, 0 when there are none.
    pub fn implied_price_median(&self) -> f64 {
        implied_price_median(self.records.iter().map(|r| (r.value_usd, r.shares))).unwrap_or(0.0)
    }
}

/// Apply the multiplier and compute dollar values and weights.
///
/// Dollar values are rounded to cents and weights to 2 decimals; every weight
/// is 0 when the quarter total is 0.
pub fn normalize(
    quarter: Quarter,
    records: &[MergedQuarterRecord],
    multiplier: u32,
    reason: UnitReason,
) -> NormalizedQuarter {
    let values: Vec<f64> = records
        .iter()
        .map(|r| round2(r.value_raw as f64 * multiplier as f64))
        .collect();
    let total: f64 = values.iter().sum();

    let normalized: Vec<NormalizedHoldingRecord> = records
        .iter()
        .zip(&values)
        .map(|(r, &value_usd)| NormalizedHoldingRecord {
            quarter,
            accession_number: r.accession_number.clone(),
            cusip: r.cusip.clone(),
            put_call: r.put_call,
            issuer_name: r.issuer_name.clone(),
            value_raw: r.value_raw,
            shares: r.shares,
            share_type: r.share_type.clone(),
            investment_discretion: r.investment_discretion.clone(),
            unit_multiplier: multiplier,
            unit_reason: reason,
            value_usd,
            total_value_usd_q: total,
            weight_pct: if total != 0.0 {
                round2(value_usd / total * 100.0)
            } else {
                0.0
            },
            ticker: None,
        })
        .collect();

    let weight_sum_pct = normalized.iter().map(|r| r.weight_pct).sum();
    NormalizedQuarter {
        quarter,
        records: normalized,
        total_value_usd: total,
        weight_sum_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use holdings_core::{PutCall, RawHoldingRecord};

    fn record(cusip: &str, value_raw: i64, shares: i64) -> RawHoldingRecord {
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        RawHoldingRecord {
            accession_number: "acc".to_string(),
            cik: "1".to_string(),
            period_of_report: date,
            filed_date: date,
            form_type: "13F-HR".to_string(),
            amendment_type: None,
            issuer_name: cusip.to_string(),
            cusip: cusip.to_string(),
            value_raw,
            shares,
            share_type: "SH".to_string(),
            put_call: None,
            investment_discretion: "SOLE".to_string(),
            row_index: 0,
        }
    }

    fn quarter() -> Quarter {
        "2024Q1".parse().unwrap()
    }

    #[test]
    fn test_values_and_weights() {
        let records = vec![record("A", 300, 3), record("B", 100, 1)];
        let q = normalize(quarter(), &records, 1000, UnitReason::ThousandsByTotalAndImpliedPrice);

        assert_abs_diff_eq!(q.total_value_usd, 400_000.0);
        assert_abs_diff_eq!(q.records[0].value_usd, 300_000.0);
        assert_abs_diff_eq!(q.records[0].weight_pct, 75.0);
        assert_abs_diff_eq!(q.records[1].weight_pct, 25.0);
        assert_abs_diff_eq!(q.weight_sum_pct, 100.0);
        assert_eq!(q.records[1].unit_multiplier, 1000);
        assert_eq!(q.records[1].unit_reason, UnitReason::ThousandsByTotalAndImpliedPrice);
        assert_abs_diff_eq!(q.records[1].total_value_usd_q, 400_000.0);
        assert_abs_diff_eq!(q.implied_price_median(), 100_000.0);
    }

    #[test]
    fn test_weights_sum_near_hundred_with_rounding() {
        let records = vec![record("A", 1, 1), record("B", 1, 1), record("C", 1, 1)];
        let q = normalize(quarter(), &records, 1, UnitReason::DollarsFallback);
        assert_abs_diff_eq!(q.records[0].weight_pct, 33.33);
        assert_abs_diff_eq!(q.weight_sum_pct, 99.99, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_total_gives_zero_weights() {
        let records = vec![record("A", 0, 5)];
        let q = normalize(quarter(), &records, 1000, UnitReason::DefaultThousandsNoData);
        assert_eq!(q.records[0].weight_pct, 0.0);
        assert_eq!(q.weight_sum_pct, 0.0);
    }

    #[test]
    fn test_carries_identity_fields() {
        let mut r = record("A", 10, 1);
        r.put_call = Some(PutCall::Call);
        let q = normalize(quarter(), &[r], 1, UnitReason::DollarsFallback);
        assert_eq!(q.records[0].put_call, Some(PutCall::Call));
        assert_eq!(q.records[0].quarter, quarter());
        assert!(q.records[0].ticker.is_none());
    }

    #[test]
    fn test_empty_quarter() {
        let q = normalize(quarter(), &[], 1000, UnitReason::DefaultThousandsNoData);
        assert!(q.records.is_empty());
        assert_eq!(q.implied_price_median(), 0.0);
    }
}
