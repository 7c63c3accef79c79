//! Small statistics helpers.

use statrs::statistics::{Data, Median};

/// Median of the values; `None` when empty.
pub fn median(values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(Data::new(values).median())
}

/// Median of `value / shares` over rows with strictly positive shares.
pub fn implied_price_median<I>(rows: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, i64)>,
{
    let prices: Vec<f64> = rows
        .into_iter()
        .filter(|&(_, shares)| shares > 0)
        .map(|(value, shares)| value / shares as f64)
        .collect();
    median(prices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_and_even() {
        assert_relative_eq!(median(vec![3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_relative_eq!(median(vec![4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
        assert!(median(vec![]).is_none());
    }

    #[test]
    fn test_implied_price_skips_zero_shares() {
        let rows = vec![(100.0, 10), (50.0, 0), (300.0, 10), (7.0, -1)];
        assert_relative_eq!(implied_price_median(rows).unwrap(), 20.0);
        assert!(implied_price_median(vec![(1.0, 0)]).is_none());
    }
}
