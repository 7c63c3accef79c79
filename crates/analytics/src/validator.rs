//! Sanity validation of a normalized quarter.
//!
//! Every check is reported, with its expected range and observed value, even
//! when it passes. The overall status is the worst individual result.

use holdings_core::config::{ValidationConfig, ValueRange};
use holdings_core::{CheckResult, ValidationReport, ValidationStatus};
use std::collections::BTreeMap;

pub const CHECK_TOTAL_VALUE: &str = "total_value_usd";
pub const CHECK_IMPLIED_PRICE: &str = "implied_price_median";
pub const CHECK_WEIGHT_SUM: &str = "weight_sum_pct";
pub const CHECK_QUARTER_COVERAGE: &str = "quarter_coverage";

/// Observed quarter figures.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput {
    pub total_value_usd: f64,
    pub weight_sum_pct: f64,
    pub implied_price_median: f64,
    /// Number of quarters ingested so far, when known.
    pub quarters_observed: Option<usize>,
}

/// Quarter validator.
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a validator from configuration.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Run all checks.
    pub fn validate(&self, input: &ValidationInput) -> ValidationReport {
        let mut checks = BTreeMap::new();
        checks.insert(
            CHECK_TOTAL_VALUE.to_string(),
            range_check(self.config.total_value_range, input.total_value_usd, ValidationStatus::Fail),
        );
        checks.insert(
            CHECK_IMPLIED_PRICE.to_string(),
            range_check(
                self.config.implied_price_range,
                input.implied_price_median,
                ValidationStatus::Warn,
            ),
        );
        checks.insert(
            CHECK_WEIGHT_SUM.to_string(),
            range_check(self.config.weight_sum_range, input.weight_sum_pct, ValidationStatus::Fail),
        );
        checks.insert(CHECK_QUARTER_COVERAGE.to_string(), self.coverage_check(input.quarters_observed));

        let status = checks
            .values()
            .map(|c| c.result)
            .max()
            .unwrap_or(ValidationStatus::Pass);
        ValidationReport { status, checks }
    }

    fn coverage_check(&self, observed: Option<usize>) -> CheckResult {
        let expected = self.config.expected_quarters;
        let (result, missing) = match (expected, observed) {
            (Some(min), Some(seen)) if seen < min => (ValidationStatus::Warn, Some(min - seen)),
            (Some(_), Some(_)) => (ValidationStatus::Pass, Some(0)),
            _ => (ValidationStatus::Pass, None),
        };
        CheckResult {
            result,
            expected: None,
            expected_min: expected,
            actual: observed.map(|n| n as f64),
            missing,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn range_check(range: ValueRange, actual: f64, on_violation: ValidationStatus) -> CheckResult {
    CheckResult {
        result: if range.contains(actual) {
            ValidationStatus::Pass
        } else {
            on_violation
        },
        expected: Some(range.bounds()),
        expected_min: None,
        actual: Some(actual),
        missing: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(total: f64, weights: f64, price: f64) -> ValidationInput {
        ValidationInput {
            total_value_usd: total,
            weight_sum_pct: weights,
            implied_price_median: price,
            quarters_observed: None,
        }
    }

    #[test]
    fn test_all_checks_pass() {
        let report = Validator::default().validate(&input(300e9, 100.0, 150.0));
        assert_eq!(report.status, ValidationStatus::Pass);
        assert_eq!(report.checks.len(), 4);
        assert!(report.checks.values().all(|c| c.result == ValidationStatus::Pass));
        let total = &report.checks[CHECK_TOTAL_VALUE];
        assert_eq!(total.expected, Some([50e9, 800e9]));
        assert_eq!(total.actual, Some(300e9));
    }

    #[test]
    fn test_total_out_of_range_fails() {
        let report = Validator::default().validate(&input(300e6, 100.0, 150.0));
        assert_eq!(report.status, ValidationStatus::Fail);
        assert_eq!(report.checks[CHECK_TOTAL_VALUE].result, ValidationStatus::Fail);
        assert_eq!(report.checks[CHECK_IMPLIED_PRICE].result, ValidationStatus::Pass);
    }

    #[test]
    fn test_price_out_of_range_only_warns() {
        let report = Validator::default().validate(&input(300e9, 100.0, 0.5));
        assert_eq!(report.status, ValidationStatus::Warn);
        assert_eq!(report.checks[CHECK_IMPLIED_PRICE].expected, Some([1.0, 20_000.0]));
    }

    #[test]
    fn test_fail_outranks_warn() {
        let report = Validator::default().validate(&input(300e9, 98.0, 50_000.0));
        assert_eq!(report.status, ValidationStatus::Fail);
        assert_eq!(report.checks[CHECK_WEIGHT_SUM].result, ValidationStatus::Fail);
        assert_eq!(report.checks[CHECK_IMPLIED_PRICE].result, ValidationStatus::Warn);
    }

    #[test]
    fn test_weight_sum_boundaries_inclusive() {
        assert_eq!(Validator::default().validate(&input(300e9, 99.5, 10.0)).status, ValidationStatus::Pass);
        assert_eq!(Validator::default().validate(&input(300e9, 100.5, 10.0)).status, ValidationStatus::Pass);
        assert_eq!(Validator::default().validate(&input(300e9, 100.51, 10.0)).status, ValidationStatus::Fail);
    }

    #[test]
    fn test_coverage_warns_below_minimum() {
        let validator = Validator::new(ValidationConfig {
            expected_quarters: Some(40),
            ..ValidationConfig::default()
        });
        let mut observed = input(300e9, 100.0, 150.0);
        observed.quarters_observed = Some(12);
        let report = validator.validate(&observed);
        assert_eq!(report.status, ValidationStatus::Warn);
        let coverage = &report.checks[CHECK_QUARTER_COVERAGE];
        assert_eq!(coverage.missing, Some(28));
        assert_eq!(coverage.expected_min, Some(40));
        assert_eq!(coverage.actual, Some(12.0));
    }

    #[test]
    fn test_coverage_skipped_without_observation() {
        let validator = Validator::new(ValidationConfig {
            expected_quarters: Some(40),
            ..ValidationConfig::default()
        });
        let report = validator.validate(&input(300e9, 100.0, 150.0));
        assert_eq!(report.checks[CHECK_QUARTER_COVERAGE].result, ValidationStatus::Pass);
        assert_eq!(report.status, ValidationStatus::Pass);
    }
}
