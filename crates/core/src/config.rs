//! Configuration structures for the holdings pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Slowest request pace accepted: one request per hour.
pub const MIN_REQUESTS_PER_SECOND: f64 = 1.0 / 3600.0;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filing source configuration.
    pub edgar: EdgarConfig,
    /// Unit multiplier inference ranges.
    pub units: UnitConfig,
    /// Amendment reconciliation configuration.
    pub merge: MergeConfig,
    /// Validation ranges.
    pub validation: ValidationConfig,
    /// Artifact and database locations.
    pub output: OutputConfig,
}

impl Config {
    /// Load from a TOML file. Missing sections and fields take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `SEC_USER_AGENT`, `HOLDINGS_DB_PATH` and `HOLDINGS_ARTIFACT_DIR`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ua) = lookup("SEC_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            self.edgar.user_agent = ua;
        }
        if let Some(db) = lookup("HOLDINGS_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.output.database_path = PathBuf::from(db);
        }
        if let Some(dir) = lookup("HOLDINGS_ARTIFACT_DIR").filter(|v| !v.trim().is_empty()) {
            self.output.artifact_dir = Some(PathBuf::from(dir));
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.edgar.user_agent.trim().is_empty() {
            return Err(Error::config("edgar.user_agent must not be empty"));
        }
        let rate = self.edgar.requests_per_second;
        if rate.is_nan() || rate < MIN_REQUESTS_PER_SECOND {
            return Err(Error::config(format!(
                "edgar.requests_per_second must be at least {MIN_REQUESTS_PER_SECOND}"
            )));
        }
        if self.edgar.retry.max_attempts == 0 {
            return Err(Error::config("edgar.retry.max_attempts must be at least 1"));
        }
        for (name, range) in [
            ("units.portfolio_range", self.units.portfolio_range),
            ("units.implied_price_range", self.units.implied_price_range),
            ("validation.total_value_range", self.validation.total_value_range),
            ("validation.implied_price_range", self.validation.implied_price_range),
            ("validation.weight_sum_range", self.validation.weight_sum_range),
        ] {
            if range.min > range.max {
                return Err(Error::config(format!("{name}: min exceeds max")));
            }
        }
        Ok(())
    }
}

/// Closed numeric interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive containment; NaN is never contained.
    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        self.min <= x && x <= self.max
    }

    /// As `[min, max]` for diagnostics.
    pub fn bounds(&self) -> [f64; 2] {
        [self.min, self.max]
    }
}

/// Filing source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgarConfig {
    /// Reporting-entity identifier (CIK).
    pub cik: String,
    /// Contact User-Agent required by the filing archive.
    pub user_agent: String,
    /// Base URL of the submissions API.
    pub data_base_url: String,
    /// Base URL of the filing archives.
    pub archives_base_url: String,
    /// Request budget.
    pub requests_per_second: f64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry policy for every request.
    pub retry: RetryConfig,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            cik: "0001067983".to_string(),
            user_agent: "holdings-ledger admin@example.com".to_string(),
            data_base_url: "https://data.sec.gov".to_string(),
            archives_base_url: "https://www.sec.gov".to_string(),
            requests_per_second: 9.0,
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each attempt after.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Unit multiplier inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Plausible portfolio total in dollars.
    pub portfolio_range: ValueRange,
    /// Plausible median implied price per share in dollars.
    pub implied_price_range: ValueRange,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            portfolio_range: ValueRange::new(50e9, 800e9),
            implied_price_range: ValueRange::new(1.0, 20_000.0),
        }
    }
}

/// Amendment reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Row count at which an untyped or NEW HOLDINGS amendment replaces the quarter.
    pub full_replace_min_rows: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            full_replace_min_rows: 20,
        }
    }
}

/// Validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Quarter total outside this range fails.
    pub total_value_range: ValueRange,
    /// Median implied price outside this range warns.
    pub implied_price_range: ValueRange,
    /// Weight sum outside this range fails.
    pub weight_sum_range: ValueRange,
    /// Minimum number of stored quarters before coverage passes. `None` disables the check.
    pub expected_quarters: Option<usize>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            total_value_range: ValueRange::new(50e9, 800e9),
            implied_price_range: ValueRange::new(1.0, 20_000.0),
            weight_sum_range: ValueRange::new(99.5, 100.5),
            expected_quarters: None,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for CSV/JSON artifacts. `None` skips artifact writing.
    pub artifact_dir: Option<PathBuf>,
    /// Artifact file name prefix.
    pub artifact_prefix: String,
    /// SQLite database file.
    pub database_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            artifact_dir: Some(PathBuf::from("data/artifacts")),
            artifact_prefix: "brk_13f".to_string(),
            database_path: PathBuf::from("data/holdings.db"),
        }
    }
}
