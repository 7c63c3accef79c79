//! Per-quarter CSV and JSON artifacts.
//!
//! Files are named `{prefix}_{quarter}_{kind}` inside the artifact directory.
//! Empty tables produce no file; the metadata document is always written.

use chrono::NaiveDate;
use holdings_core::{Error, Quarter, QuarterDataset, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Paths written for one quarter.
#[derive(Debug, Clone, Default)]
pub struct ArtifactPaths {
    pub raw_csv: Option<PathBuf>,
    pub clean_csv: Option<PathBuf>,
    pub agg_csv: Option<PathBuf>,
    pub meta_json: PathBuf,
}

/// Raw line as exported, tagged with its quarter.
#[derive(Serialize)]
struct RawRow<'a> {
    quarter: Quarter,
    accession_number: &'a str,
    cik: &'a str,
    period_of_report: NaiveDate,
    filed_date: NaiveDate,
    form_type: &'a str,
    amendment_type: Option<&'a str>,
    issuer_name: &'a str,
    cusip: &'a str,
    value_raw: i64,
    shares: i64,
    share_type: &'a str,
    put_call: Option<&'static str>,
    investment_discretion: &'a str,
    row_index: usize,
}

/// Writes quarter artifacts into a directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    prefix: String,
}

impl ArtifactWriter {
    /// Create a writer for `dir` using file-name `prefix`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, quarter: Quarter, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}_{}", self.prefix, quarter, suffix))
    }

    /// Write all artifacts of a quarter, replacing earlier ones.
    pub fn write(&self, dataset: &QuarterDataset) -> Result<ArtifactPaths> {
        std::fs::create_dir_all(&self.dir)?;
        let quarter = dataset.quarter;

        let raw_rows: Vec<RawRow<'_>> = dataset
            .merged
            .iter()
            .map(|r| RawRow {
                quarter,
                accession_number: &r.accession_number,
                cik: &r.cik,
                period_of_report: r.period_of_report,
                filed_date: r.filed_date,
                form_type: &r.form_type,
                amendment_type: r.amendment_type.as_deref(),
                issuer_name: &r.issuer_name,
                cusip: &r.cusip,
                value_raw: r.value_raw,
                shares: r.shares,
                share_type: &r.share_type,
                put_call: r.put_call.map(|p| p.as_str()),
                investment_discretion: &r.investment_discretion,
                row_index: r.row_index,
            })
            .collect();

        let paths = ArtifactPaths {
            raw_csv: self.write_csv(self.path_for(quarter, "raw.csv"), &raw_rows)?,
            clean_csv: self.write_csv(self.path_for(quarter, "clean.csv"), &dataset.normalized)?,
            agg_csv: self.write_csv(self.path_for(quarter, "agg.csv"), &dataset.aggregated)?,
            meta_json: self.path_for(quarter, "meta.json"),
        };

        let file = File::create(&paths.meta_json)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &dataset.meta)?;

        debug!(%quarter, dir = %self.dir.display(), "Wrote quarter artifacts");
        Ok(paths)
    }

    fn write_csv<T: Serialize>(&self, path: PathBuf, rows: &[T]) -> Result<Option<PathBuf>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| Error::artifact(format!("{}: {e}", path.display())))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| Error::artifact(format!("{}: {e}", path.display())))?;
        }
        writer.flush()?;
        Ok(Some(path))
    }
}
