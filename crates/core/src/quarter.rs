//! Calendar reporting quarters.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A calendar quarter, e.g. `2024Q3`.
///
/// Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    year: i32,
    q: u8,
}

impl Quarter {
    /// Create a quarter; `q` must be in 1..=4.
    pub fn new(year: i32, q: u8) -> Option<Self> {
        (1..=4).contains(&q).then_some(Self { year, q })
    }

    /// Quarter containing the given period-of-report date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            q: ((date.month() - 1) / 3 + 1) as u8,
        }
    }

    /// Calendar year.
    pub fn year(self) -> i32 {
        self.year
    }

    /// Quarter number (1-4).
    pub fn number(self) -> u8 {
        self.q
    }

    /// The literal preceding calendar quarter (Q1 rolls back to prior-year Q4).
    pub fn previous(self) -> Self {
        if self.q == 1 {
            Self { year: self.year - 1, q: 4 }
        } else {
            Self { year: self.year, q: self.q - 1 }
        }
    }

    /// Last calendar day of the quarter.
    pub fn end_date(self) -> NaiveDate {
        let (month, day) = match self.q {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}Q{}", self.year, self.q)
    }
}

impl FromStr for Quarter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (year, q) = s
            .split_once(['Q', 'q'])
            .ok_or_else(|| Error::data(format!("invalid quarter '{s}', expected YYYYQn")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| Error::data(format!("invalid quarter year in '{s}'")))?;
        let q: u8 = q
            .parse()
            .map_err(|_| Error::data(format!("invalid quarter number in '{s}'")))?;
        Quarter::new(year, q).ok_or_else(|| Error::data(format!("quarter out of range in '{s}'")))
    }
}

impl Serialize for Quarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_date() {
        let d = NaiveDate::from_ymd_opt(2024, 9, 30).unwrap();
        assert_eq!(Quarter::from_date(d).to_string(), "2024Q3");
        let d = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(Quarter::from_date(d).to_string(), "2023Q1");
        let d = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(Quarter::from_date(d).to_string(), "2023Q4");
    }

    #[test]
    fn test_previous_rolls_year() {
        let q: Quarter = "2024Q1".parse().unwrap();
        assert_eq!(q.previous().to_string(), "2023Q4");
        let q: Quarter = "2024Q3".parse().unwrap();
        assert_eq!(q.previous().to_string(), "2024Q2");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("2024Q5".parse::<Quarter>().is_err());
        assert!("2024".parse::<Quarter>().is_err());
        assert!("abcdQ1".parse::<Quarter>().is_err());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a: Quarter = "2023Q4".parse().unwrap();
        let b: Quarter = "2024Q1".parse().unwrap();
        assert!(a < b);
        assert_eq!(b.end_date(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_serde_as_string() {
        let q: Quarter = "2022Q2".parse().unwrap();
        let json = serde_json::to_string(&q).unwrap();
        assert_eq!(json, "\"2022Q2\"");
        let back: Quarter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
