//! Per-security aggregation with ranks and quarter-over-quarter deltas.
//!
//! Option variants of a security are summed into one row. Securities held in
//! the previous quarter but absent now are not emitted.

use holdings_core::{round2, AggregatedHoldingRecord, ChangeType, NormalizedHoldingRecord, Quarter};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

/// Running totals for one security.
#[derive(Debug, Clone)]
struct Group {
    cusip: String,
    issuer_name: String,
    ticker: Option<String>,
    value_usd: f64,
    shares: i64,
    weight_pct: f64,
}

/// Build ranked, delta-annotated rows for a quarter.
///
/// `previous` is the stored aggregate of the literal preceding quarter; rows
/// belonging to any other quarter are ignored. Ties in value keep input order.
pub fn aggregate(
    quarter: Quarter,
    records: &[NormalizedHoldingRecord],
    previous: &[AggregatedHoldingRecord],
) -> Vec<AggregatedHoldingRecord> {
    let mut groups = group_by_security(records);
    groups.sort_by_key(|g| Reverse(OrderedFloat(g.value_usd)));

    let prev_quarter = quarter.previous();
    let prev: HashMap<&str, &AggregatedHoldingRecord> = previous
        .iter()
        .filter(|p| p.quarter == prev_quarter)
        .map(|p| (p.cusip.as_str(), p))
        .collect();
    if prev.len() < previous.len() {
        debug!(
            quarter = %quarter,
            ignored = previous.len() - prev.len(),
            "ignoring previous rows outside the preceding quarter"
        );
    }
    let prev_ref = (!prev.is_empty()).then_some(prev_quarter);

    groups
        .into_iter()
        .enumerate()
        .map(|(i, g)| {
            let matched = prev.get(g.cusip.as_str()).copied();
            let change_type = match matched {
                None => ChangeType::New,
                Some(p) if p.value_usd > g.value_usd => ChangeType::Decreased,
                Some(p) if p.value_usd < g.value_usd => ChangeType::Increased,
                Some(_) => ChangeType::Unchanged,
            };
            AggregatedHoldingRecord {
                quarter,
                cusip: g.cusip,
                issuer_name: g.issuer_name,
                ticker: g.ticker,
                value_usd: g.value_usd,
                shares: g.shares,
                weight_pct: g.weight_pct,
                rank: (i + 1) as u32,
                prev_quarter: prev_ref,
                prev_value_usd: matched.map(|p| p.value_usd),
                prev_weight_pct: matched.map(|p| p.weight_pct),
                delta_value_usd: matched.map(|p| g.value_usd - p.value_usd),
                delta_weight_pct: matched.map(|p| round2(g.weight_pct - p.weight_pct)),
                change_type,
            }
        })
        .collect()
}

/// Groups in first-seen order; issuer name and ticker come from the first line.
fn group_by_security(records: &[NormalizedHoldingRecord]) -> Vec<Group> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for r in records {
        match index.get(r.cusip.as_str()) {
            Some(&i) => {
                let g = &mut groups[i];
                g.value_usd += r.value_usd;
                g.shares = g.shares.saturating_add(r.shares);
                g.weight_pct += r.weight_pct;
                if g.ticker.is_none() {
                    g.ticker = r.ticker.clone();
                }
            }
            None => {
                index.insert(r.cusip.as_str(), groups.len());
                groups.push(Group {
                    cusip: r.cusip.clone(),
                    issuer_name: r.issuer_name.clone(),
                    ticker: r.ticker.clone(),
                    value_usd: r.value_usd,
                    shares: r.shares,
                    weight_pct: r.weight_pct,
                });
            }
        }
    }
    groups
}
