//! Unit multiplier inference.
//!
//! Filings report values either in dollars or in thousands of dollars. Both
//! readings are tried against a plausible portfolio total and a plausible
//! median price per share, and an ordered decision table picks the multiplier.

use holdings_core::config::{UnitConfig, ValueRange};
use holdings_core::{MergedQuarterRecord, UnitReason};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::stats::implied_price_median;

/// Values reported in thousands of dollars.
pub const THOUSANDS: u32 = 1000;

/// Values reported in dollars.
pub const DOLLARS: u32 = 1;

/// One candidate multiplier evaluated against the quarter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateCheck {
    pub multiplier: u32,
    pub total_usd: f64,
    /// NaN when no line has positive shares.
    pub implied_price_median: f64,
    pub passes_total: bool,
    pub passes_price: bool,
}

impl CandidateCheck {
    /// Passes both the total and the price check.
    pub fn passes(&self) -> bool {
        self.passes_total && self.passes_price
    }
}

/// Chosen multiplier, why, and the evidence behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitResolution {
    pub multiplier: u32,
    pub reason: UnitReason,
    pub thousands: CandidateCheck,
    pub dollars: CandidateCheck,
}

/// Inputs the decision table looks at.
#[derive(Debug, Clone, Copy)]
struct Evaluation {
    raw_total: i128,
    priced_rows: usize,
    thousands: CandidateCheck,
    dollars: CandidateCheck,
}

/// A row of the decision table.
struct UnitRule {
    applies: fn(&Evaluation) -> bool,
    multiplier: u32,
    reason: UnitReason,
}

fn no_data(e: &Evaluation) -> bool {
    e.raw_total <= 0
}

fn no_shares(e: &Evaluation) -> bool {
    e.priced_rows == 0
}

fn only_thousands_passes(e: &Evaluation) -> bool {
    e.thousands.passes() && !e.dollars.passes()
}

fn only_dollars_passes(e: &Evaluation) -> bool {
    e.dollars.passes() && !e.thousands.passes()
}

fn both_pass(e: &Evaluation) -> bool {
    e.thousands.passes() && e.dollars.passes()
}

fn nothing_passes(e: &Evaluation) -> bool {
    let any_total = e.thousands.passes_total || e.dollars.passes_total;
    let any_price = e.thousands.passes_price || e.dollars.passes_price;
    !any_total && !any_price
}

fn always(_: &Evaluation) -> bool {
    true
}

/// Evaluated top to bottom; the first matching rule decides.
const DECISION_TABLE: [UnitRule; 6] = [
    UnitRule {
        applies: no_data,
        multiplier: THOUSANDS,
        reason: UnitReason::DefaultThousandsNoData,
    },
    UnitRule {
        applies: no_shares,
        multiplier: THOUSANDS,
        reason: UnitReason::DefaultThousandsNoShares,
    },
    UnitRule {
        applies: only_thousands_passes,
        multiplier: THOUSANDS,
        reason: UnitReason::ThousandsByTotalAndImpliedPrice,
    },
    UnitRule {
        applies: only_dollars_passes,
        multiplier: DOLLARS,
        reason: UnitReason::DollarsByTotalAndImpliedPriceWarn,
    },
    UnitRule {
        applies: both_pass,
        multiplier: THOUSANDS,
        reason: UnitReason::ThousandsPreferredWhenBothPass,
    },
    UnitRule {
        applies: nothing_passes,
        multiplier: THOUSANDS,
        reason: UnitReason::FailBothCandidatesUsingThousands,
    },
];

/// Applies when one candidate passes one axis and the other passes the other.
const FALLBACK: UnitRule = UnitRule {
    applies: always,
    multiplier: DOLLARS,
    reason: UnitReason::DollarsFallback,
};

/// Unit multiplier resolver.
pub struct UnitResolver {
    portfolio_range: ValueRange,
    implied_price_range: ValueRange,
}

impl UnitResolver {
    /// Create a resolver with explicit ranges.
    pub fn new(portfolio_range: ValueRange, implied_price_range: ValueRange) -> Self {
        Self {
            portfolio_range,
            implied_price_range,
        }
    }

    /// Create a resolver from configuration.
    pub fn from_config(config: &UnitConfig) -> Self {
        Self::new(config.portfolio_range, config.implied_price_range)
    }

    /// Choose the multiplier for a reconciled quarter.
    pub fn resolve(&self, records: &[MergedQuarterRecord]) -> UnitResolution {
        let raw_total: i128 = records.iter().map(|r| i128::from(r.value_raw)).sum();
        let priced_rows = records.iter().filter(|r| r.shares > 0).count();
        let evaluation = Evaluation {
            raw_total,
            priced_rows,
            thousands: self.check(records, raw_total, THOUSANDS),
            dollars: self.check(records, raw_total, DOLLARS),
        };

        let rule = DECISION_TABLE
            .iter()
            .find(|rule| (rule.applies)(&evaluation))
            .unwrap_or(&FALLBACK);

        let resolution = UnitResolution {
            multiplier: rule.multiplier,
            reason: rule.reason,
            thousands: evaluation.thousands,
            dollars: evaluation.dollars,
        };
        if rule.reason.is_warning() {
            warn!(
                multiplier = resolution.multiplier,
                reason = %resolution.reason,
                total_x1000 = resolution.thousands.total_usd,
                total_x1 = resolution.dollars.total_usd,
                "unit multiplier chosen with low confidence"
            );
        } else {
            debug!(multiplier = resolution.multiplier, reason = %resolution.reason, "unit multiplier chosen");
        }
        resolution
    }

    fn check(&self, records: &[MergedQuarterRecord], raw_total: i128, multiplier: u32) -> CandidateCheck {
        let factor = multiplier as f64;
        let total_usd = raw_total as f64 * factor;
        let implied = implied_price_median(
            records.iter().map(|r| (r.value_raw as f64 * factor, r.shares)),
        )
        .unwrap_or(f64::NAN);

        CandidateCheck {
            multiplier,
            total_usd,
            implied_price_median: implied,
            passes_total: self.portfolio_range.contains(total_usd),
            passes_price: self.implied_price_range.contains(implied),
        }
    }
}

impl Default for UnitResolver {
    fn default() -> Self {
        Self::from_config(&UnitConfig::default())
    }
}
