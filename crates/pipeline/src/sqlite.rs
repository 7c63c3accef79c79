//! SQLite-backed holdings store.

use crate::store::HoldingsStore;
use chrono::{DateTime, Utc};
use holdings_core::{
    AggregatedHoldingRecord, ChangeType, Error, NormalizedHoldingRecord, PutCall, Quarter,
    QuarterDataset, QuarterMeta, Result, UnitReason, ValidationStatus,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS holdings_clean (
    quarter TEXT NOT NULL,
    line INTEGER NOT NULL,
    accession_number TEXT NOT NULL,
    cusip TEXT NOT NULL,
    put_call TEXT NOT NULL DEFAULT '',
    issuer_name TEXT NOT NULL,
    value_raw INTEGER NOT NULL,
    shares INTEGER NOT NULL,
    share_type TEXT NOT NULL,
    investment_discretion TEXT NOT NULL,
    unit_multiplier INTEGER NOT NULL,
    unit_reason TEXT NOT NULL,
    value_usd REAL NOT NULL,
    total_value_usd_q REAL NOT NULL,
    weight_pct REAL NOT NULL,
    ticker TEXT,
    PRIMARY KEY (quarter, line)
);
CREATE INDEX IF NOT EXISTS idx_holdings_clean_key ON holdings_clean (quarter, cusip, put_call);

CREATE TABLE IF NOT EXISTS holdings_agg (
    quarter TEXT NOT NULL,
    cusip TEXT NOT NULL,
    issuer_name TEXT NOT NULL,
    ticker TEXT,
    value_usd REAL NOT NULL,
    shares INTEGER NOT NULL,
    weight_pct REAL NOT NULL,
    rank INTEGER NOT NULL,
    prev_quarter TEXT,
    prev_value_usd REAL,
    prev_weight_pct REAL,
    delta_value_usd REAL,
    delta_weight_pct REAL,
    change_type TEXT NOT NULL,
    PRIMARY KEY (quarter, cusip)
);

CREATE TABLE IF NOT EXISTS filing_meta (
    quarter TEXT PRIMARY KEY,
    used_accessions TEXT NOT NULL,
    amendment_types TEXT NOT NULL,
    unit_multiplier INTEGER NOT NULL,
    unit_reason TEXT NOT NULL,
    total_value_usd REAL NOT NULL,
    weight_sum_pct REAL NOT NULL,
    implied_price_median REAL NOT NULL,
    num_holdings INTEGER NOT NULL,
    validation_status TEXT NOT NULL,
    validation_details TEXT NOT NULL,
    sec_filing_urls TEXT NOT NULL,
    processed_at TEXT NOT NULL
);
";

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

/// Holdings store persisted in a single SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        debug!(path = %path.display(), "Opened holdings database");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn })
    }
}

impl HoldingsStore for SqliteStore {
    fn quarter_status(&self, quarter: Quarter) -> Result<Option<ValidationStatus>> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT validation_status FROM filing_meta WHERE quarter = ?1",
                params![quarter.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        status.map(|s| s.parse()).transpose()
    }

    fn load_aggregate(&self, quarter: Quarter) -> Result<Vec<AggregatedHoldingRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT cusip, issuer_name, ticker, value_usd, shares, weight_pct, rank,
                        prev_quarter, prev_value_usd, prev_weight_pct,
                        delta_value_usd, delta_weight_pct, change_type
                 FROM holdings_agg WHERE quarter = ?1 ORDER BY rank",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![quarter.to_string()], |row| {
                let record = AggregatedHoldingRecord {
                    quarter,
                    cusip: row.get(0)?,
                    issuer_name: row.get(1)?,
                    ticker: row.get(2)?,
                    value_usd: row.get(3)?,
                    shares: row.get(4)?,
                    weight_pct: row.get(5)?,
                    rank: row.get(6)?,
                    prev_quarter: None,
                    prev_value_usd: row.get(8)?,
                    prev_weight_pct: row.get(9)?,
                    delta_value_usd: row.get(10)?,
                    delta_weight_pct: row.get(11)?,
                    change_type: ChangeType::New,
                };
                let prev_quarter: Option<String> = row.get(7)?;
                let change_type: String = row.get(12)?;
                Ok((record, prev_quarter, change_type))
            })
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (mut record, prev_quarter, change_type) = row.map_err(db_err)?;
            record.prev_quarter = prev_quarter.map(|q| q.parse()).transpose()?;
            record.change_type = change_type.parse()?;
            out.push(record);
        }
        Ok(out)
    }

    fn load_normalized(&self, quarter: Quarter) -> Result<Vec<NormalizedHoldingRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT accession_number, cusip, put_call, issuer_name, value_raw, shares,
                        share_type, investment_discretion, unit_multiplier, unit_reason,
                        value_usd, total_value_usd_q, weight_pct, ticker
                 FROM holdings_clean WHERE quarter = ?1 ORDER BY line",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![quarter.to_string()], |row| {
                let put_call: String = row.get(2)?;
                let record = NormalizedHoldingRecord {
                    quarter,
                    accession_number: row.get(0)?,
                    cusip: row.get(1)?,
                    put_call: PutCall::parse_optional(&put_call),
                    issuer_name: row.get(3)?,
                    value_raw: row.get(4)?,
                    shares: row.get(5)?,
                    share_type: row.get(6)?,
                    investment_discretion: row.get(7)?,
                    unit_multiplier: row.get(8)?,
                    unit_reason: UnitReason::DefaultThousandsNoData,
                    value_usd: row.get(10)?,
                    total_value_usd_q: row.get(11)?,
                    weight_pct: row.get(12)?,
                    ticker: row.get(13)?,
                };
                let reason: String = row.get(9)?;
                Ok((record, reason))
            })
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (mut record, reason) = row.map_err(db_err)?;
            record.unit_reason = reason.parse()?;
            out.push(record);
        }
        Ok(out)
    }

    fn load_meta(&self, quarter: Quarter) -> Result<Option<QuarterMeta>> {
        let row = self
            .conn
            .query_row(
                "SELECT used_accessions, amendment_types, unit_multiplier, unit_reason,
                        total_value_usd, weight_sum_pct, implied_price_median, num_holdings,
                        validation_status, validation_details, sec_filing_urls, processed_at
                 FROM filing_meta WHERE quarter = ?1",
                params![quarter.to_string()],
                |row| {
                    Ok(MetaRow {
                        used_accessions: row.get(0)?,
                        amendment_types: row.get(1)?,
                        unit_multiplier: row.get(2)?,
                        unit_reason: row.get(3)?,
                        total_value_usd: row.get(4)?,
                        weight_sum_pct: row.get(5)?,
                        implied_price_median: row.get(6)?,
                        num_holdings: row.get(7)?,
                        validation_status: row.get(8)?,
                        validation_details: row.get(9)?,
                        sec_filing_urls: row.get(10)?,
                        processed_at: row.get(11)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        row.map(|r| r.into_meta(quarter)).transpose()
    }

    fn stored_quarters(&self) -> Result<Vec<Quarter>> {
        let mut stmt = self
            .conn
            .prepare("SELECT quarter FROM filing_meta")
            .map_err(db_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut quarters = Vec::new();
        for name in names {
            quarters.push(name.map_err(db_err)?.parse::<Quarter>()?);
        }
        quarters.sort();
        Ok(quarters)
    }

    fn replace_quarter(&mut self, dataset: &QuarterDataset) -> Result<()> {
        let quarter = dataset.quarter.to_string();
        let meta = &dataset.meta;
        let tx = self.conn.transaction().map_err(db_err)?;

        for table in ["holdings_clean", "holdings_agg", "filing_meta"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE quarter = ?1"),
                params![quarter],
            )
            .map_err(db_err)?;
        }

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO holdings_clean (
                        quarter, line, accession_number, cusip, put_call, issuer_name,
                        value_raw, shares, share_type, investment_discretion,
                        unit_multiplier, unit_reason, value_usd, total_value_usd_q,
                        weight_pct, ticker
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                )
                .map_err(db_err)?;
            for (line, r) in dataset.normalized.iter().enumerate() {
                stmt.execute(params![
                    quarter,
                    line as i64,
                    r.accession_number,
                    r.cusip,
                    r.put_call.map(PutCall::as_str).unwrap_or(""),
                    r.issuer_name,
                    r.value_raw,
                    r.shares,
                    r.share_type,
                    r.investment_discretion,
                    r.unit_multiplier,
                    r.unit_reason.as_str(),
                    r.value_usd,
                    r.total_value_usd_q,
                    r.weight_pct,
                    r.ticker.as_deref(),
                ])
                .map_err(db_err)?;
            }

            let mut stmt = tx
                .prepare(
                    "INSERT INTO holdings_agg (
                        quarter, cusip, issuer_name, ticker, value_usd, shares, weight_pct,
                        rank, prev_quarter, prev_value_usd, prev_weight_pct,
                        delta_value_usd, delta_weight_pct, change_type
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                )
                .map_err(db_err)?;
            for r in &dataset.aggregated {
                stmt.execute(params![
                    quarter,
                    r.cusip,
                    r.issuer_name,
                    r.ticker.as_deref(),
                    r.value_usd,
                    r.shares,
                    r.weight_pct,
                    r.rank,
                    r.prev_quarter.map(|q| q.to_string()),
                    r.prev_value_usd,
                    r.prev_weight_pct,
                    r.delta_value_usd,
                    r.delta_weight_pct,
                    r.change_type.as_str(),
                ])
                .map_err(db_err)?;
            }
        }

        tx.execute(
            "INSERT INTO filing_meta (
                quarter, used_accessions, amendment_types, unit_multiplier, unit_reason,
                total_value_usd, weight_sum_pct, implied_price_median, num_holdings,
                validation_status, validation_details, sec_filing_urls, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                quarter,
                serde_json::to_string(&meta.used_accessions)?,
                serde_json::to_string(&meta.amendment_types)?,
                meta.unit_multiplier,
                meta.unit_reason.as_str(),
                meta.total_value_usd,
                meta.weight_sum_pct,
                meta.implied_price_median,
                meta.num_holdings as i64,
                meta.validation_status.as_str(),
                serde_json::to_string(&meta.validation_details)?,
                serde_json::to_string(&meta.sec_filing_urls)?,
                meta.processed_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        debug!(
            quarter = %dataset.quarter,
            clean = dataset.normalized.len(),
            aggregated = dataset.aggregated.len(),
            "Replaced stored quarter"
        );
        Ok(())
    }
}

struct MetaRow {
    used_accessions: String,
    amendment_types: String,
    unit_multiplier: u32,
    unit_reason: String,
    total_value_usd: f64,
    weight_sum_pct: f64,
    implied_price_median: f64,
    num_holdings: i64,
    validation_status: String,
    validation_details: String,
    sec_filing_urls: String,
    processed_at: String,
}

impl MetaRow {
    fn into_meta(self, quarter: Quarter) -> Result<QuarterMeta> {
        let processed_at = DateTime::parse_from_rfc3339(&self.processed_at)
            .map_err(|e| Error::database(format!("bad processed_at for {quarter}: {e}")))?
            .with_timezone(&Utc);
        Ok(QuarterMeta {
            quarter,
            used_accessions: serde_json::from_str(&self.used_accessions)?,
            amendment_types: serde_json::from_str(&self.amendment_types)?,
            unit_multiplier: self.unit_multiplier,
            unit_reason: self.unit_reason.parse()?,
            total_value_usd: self.total_value_usd,
            weight_sum_pct: self.weight_sum_pct,
            implied_price_median: self.implied_price_median,
            num_holdings: usize::try_from(self.num_holdings).unwrap_or_default(),
            validation_status: self.validation_status.parse()?,
            validation_details: serde_json::from_str(&self.validation_details)?,
            sec_filing_urls: serde_json::from_str(&self.sec_filing_urls)?,
            processed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_dataset;
    use tempfile::tempdir;

    #[test]
    fn test_replace_and_load_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let dataset = sample_dataset("2024Q4".parse().unwrap());
        store.replace_quarter(&dataset).unwrap();

        let quarter = dataset.quarter;
        assert_eq!(
            store.quarter_status(quarter).unwrap(),
            Some(dataset.meta.validation_status)
        );
        assert_eq!(store.load_aggregate(quarter).unwrap(), dataset.aggregated);
        assert_eq!(store.load_normalized(quarter).unwrap(), dataset.normalized);

        let meta = store.load_meta(quarter).unwrap().unwrap();
        assert_eq!(meta.used_accessions, dataset.meta.used_accessions);
        assert_eq!(meta.validation_details, dataset.meta.validation_details);
        assert_eq!(meta.processed_at, dataset.meta.processed_at);
        assert_eq!(meta.num_holdings, dataset.meta.num_holdings);
    }

    #[test]
    fn test_replace_discards_previous_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let quarter: Quarter = "2024Q4".parse().unwrap();
        let mut dataset = sample_dataset(quarter);
        store.replace_quarter(&dataset).unwrap();

        dataset.normalized.truncate(1);
        dataset.aggregated.truncate(1);
        dataset.meta.validation_status = ValidationStatus::Fail;
        store.replace_quarter(&dataset).unwrap();

        assert_eq!(store.load_normalized(quarter).unwrap().len(), 1);
        assert_eq!(store.load_aggregate(quarter).unwrap().len(), 1);
        assert_eq!(
            store.quarter_status(quarter).unwrap(),
            Some(ValidationStatus::Fail)
        );
    }

    #[test]
    fn test_duplicate_merge_keys_are_stored() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let quarter: Quarter = "2024Q4".parse().unwrap();
        let mut dataset = sample_dataset(quarter);
        let duplicate = dataset.normalized[0].clone();
        dataset.normalized.push(duplicate);
        store.replace_quarter(&dataset).unwrap();

        assert_eq!(
            store.load_normalized(quarter).unwrap().len(),
            dataset.normalized.len()
        );
    }

    #[test]
    fn test_unknown_quarter_is_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        let quarter: Quarter = "2001Q1".parse().unwrap();
        assert_eq!(store.quarter_status(quarter).unwrap(), None);
        assert!(store.load_aggregate(quarter).unwrap().is_empty());
        assert!(store.load_meta(quarter).unwrap().is_none());
    }

    #[test]
    fn test_open_creates_file_and_lists_quarters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("holdings.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .replace_quarter(&sample_dataset("2024Q4".parse().unwrap()))
                .unwrap();
            store
                .replace_quarter(&sample_dataset("2024Q3".parse().unwrap()))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let quarters: Vec<String> = store
            .stored_quarters()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(quarters, vec!["2024Q3", "2024Q4"]);
    }
}
