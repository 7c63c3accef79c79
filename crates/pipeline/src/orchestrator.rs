//! Pipeline orchestration.
//!
//! Filings are grouped by reporting quarter and quarters run oldest first, so a
//! quarter's predecessor is already persisted when its deltas are computed.

use crate::alerts::{AlertSink, LogAlertSink};
use crate::artifacts::ArtifactWriter;
use crate::store::HoldingsStore;
use chrono::{NaiveDate, Utc};
use holdings_analytics::{aggregate, normalize, UnitResolver, ValidationInput, Validator};
use holdings_core::{
    AggregatedHoldingRecord, Config, FilingMetadata, Quarter, QuarterDataset, QuarterMeta,
    RawHoldingRecord, Result, ValidationStatus,
};
use holdings_ingestion::fetcher::archive_folder_url;
use holdings_ingestion::{Amendment, AmendmentMerger, FilingSource, InfoTableParser};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Options for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only consider filings submitted on or after this date.
    pub since: Option<NaiveDate>,
    /// Reprocess quarters already stored with PASS or WARN.
    pub force: bool,
    /// Restrict processing to these quarters.
    pub quarters: Option<BTreeSet<Quarter>>,
}

/// A quarter-scoped (or run-scoped, when `quarter` is `None`) failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterFailure {
    pub quarter: Option<Quarter>,
    pub error: String,
}

/// Headline figures of a processed quarter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedQuarter {
    pub quarter: Quarter,
    pub validation_status: ValidationStatus,
    pub unit_multiplier: u32,
    pub total_value_usd: f64,
    pub num_holdings: usize,
}

impl From<&QuarterMeta> for ProcessedQuarter {
    fn from(meta: &QuarterMeta) -> Self {
        Self {
            quarter: meta.quarter,
            validation_status: meta.validation_status,
            unit_multiplier: meta.unit_multiplier,
            total_value_usd: meta.total_value_usd,
            num_holdings: meta.num_holdings,
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Filings returned by the source.
    pub fetched: usize,
    pub succeeded: Vec<ProcessedQuarter>,
    /// Already stored with PASS or WARN.
    pub skipped: Vec<Quarter>,
    /// No usable base filing, or nothing left after merging.
    pub excluded: Vec<Quarter>,
    pub failed: Vec<QuarterFailure>,
    /// Quarters computed (and counted as succeeded) whose storage write failed.
    pub persist_failures: Vec<QuarterFailure>,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Quarters that succeeded, in processing order.
    pub fn succeeded_quarters(&self) -> Vec<Quarter> {
        self.succeeded.iter().map(|p| p.quarter).collect()
    }

    /// True when nothing failed, computationally or in storage.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.persist_failures.is_empty()
    }
}

enum QuarterOutcome {
    Skipped,
    Excluded,
    Processed {
        processed: ProcessedQuarter,
        persist_error: Option<String>,
    },
}

/// Runs filings through merge, unit resolution, normalization, validation and aggregation.
pub struct Pipeline<S> {
    source: S,
    cik: String,
    archives_base_url: String,
    parser: InfoTableParser,
    merger: AmendmentMerger,
    resolver: UnitResolver,
    validator: Validator,
    expected_quarters: Option<usize>,
    artifacts: Option<ArtifactWriter>,
    alerts: Arc<dyn AlertSink>,
}

impl<S: FilingSource> Pipeline<S> {
    /// Build a pipeline from configuration. Artifacts go to the configured
    /// directory, alerts to the log.
    pub fn new(config: &Config, source: S) -> Self {
        let artifacts = config
            .output
            .artifact_dir
            .as_ref()
            .map(|dir| ArtifactWriter::new(dir, config.output.artifact_prefix.clone()));
        Self {
            source,
            cik: config.edgar.cik.clone(),
            archives_base_url: config.edgar.archives_base_url.clone(),
            parser: InfoTableParser::new(config.edgar.cik.clone()),
            merger: AmendmentMerger::new(config.merge.full_replace_min_rows),
            resolver: UnitResolver::from_config(&config.units),
            validator: Validator::new(config.validation.clone()),
            expected_quarters: config.validation.expected_quarters,
            artifacts,
            alerts: Arc::new(LogAlertSink),
        }
    }

    /// Replace the alert sink.
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Replace (or disable, with `None`) the artifact writer.
    pub fn with_artifacts(mut self, artifacts: Option<ArtifactWriter>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Process every quarter found among the listed filings.
    ///
    /// Quarter-scoped errors are recorded in the summary and never abort the run.
    pub async fn run(&self, store: &mut dyn HoldingsStore, options: &RunOptions) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let filings = match self.source.list_filings(options.since).await {
            Ok(filings) => filings,
            Err(e) => {
                error!(error = %e, "Failed to list filings");
                self.alerts
                    .send("13F ingest: listing failed", &format!("Could not list filings: {e}"));
                summary.failed.push(QuarterFailure {
                    quarter: None,
                    error: e.to_string(),
                });
                summary.duration_ms = elapsed_ms(started);
                return summary;
            }
        };
        summary.fetched = filings.len();

        let mut by_quarter: BTreeMap<Quarter, Vec<FilingMetadata>> = BTreeMap::new();
        for filing in filings {
            by_quarter.entry(filing.quarter()).or_default().push(filing);
        }
        info!(
            filings = summary.fetched,
            quarters = by_quarter.len(),
            "Grouped filings by quarter"
        );

        for (&quarter, filings) in &by_quarter {
            if let Some(wanted) = &options.quarters {
                if !wanted.contains(&quarter) {
                    continue;
                }
            }

            match self.process_quarter(store, quarter, filings, options.force).await {
                Ok(QuarterOutcome::Skipped) => summary.skipped.push(quarter),
                Ok(QuarterOutcome::Excluded) => summary.excluded.push(quarter),
                Ok(QuarterOutcome::Processed {
                    processed,
                    persist_error,
                }) => {
                    if let Some(error) = persist_error {
                        summary.persist_failures.push(QuarterFailure {
                            quarter: Some(quarter),
                            error,
                        });
                    }
                    summary.succeeded.push(processed);
                }
                Err(e) => {
                    error!(%quarter, error = %e, "Quarter failed");
                    self.alerts
                        .send("13F ingest: quarter failed", &format!("Quarter {quarter}: {e}"));
                    summary.failed.push(QuarterFailure {
                        quarter: Some(quarter),
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.duration_ms = elapsed_ms(started);
        info!(
            fetched = summary.fetched,
            succeeded = summary.succeeded.len(),
            skipped = summary.skipped.len(),
            excluded = summary.excluded.len(),
            failed = summary.failed.len(),
            persist_failures = summary.persist_failures.len(),
            duration_ms = summary.duration_ms,
            "Pipeline run finished"
        );
        summary
    }

    async fn process_quarter(
        &self,
        store: &mut dyn HoldingsStore,
        quarter: Quarter,
        filings: &[FilingMetadata],
        force: bool,
    ) -> Result<QuarterOutcome> {
        let Some(base) = filings
            .iter()
            .filter(|f| f.is_base())
            .max_by_key(|f| f.filing_date)
        else {
            debug!(%quarter, "No base filing, excluding quarter");
            return Ok(QuarterOutcome::Excluded);
        };

        if !force {
            if let Some(status) = store.quarter_status(quarter)? {
                if status.is_settled() {
                    info!(%quarter, %status, "Quarter already stored, skipping");
                    return Ok(QuarterOutcome::Skipped);
                }
            }
        }

        info!(%quarter, accession = %base.accession_number, "Processing quarter");
        let xml = self.source.fetch_information_table(base).await?;
        let base_records = self.parser.parse(&xml, base)?;

        let mut amendment_filings: Vec<&FilingMetadata> =
            filings.iter().filter(|f| f.is_amendment()).collect();
        amendment_filings.sort_by_key(|f| f.filing_date);
        let mut amendments = Vec::with_capacity(amendment_filings.len());
        for filing in amendment_filings {
            match self.load_amendment(filing).await {
                Ok(amendment) => amendments.push(amendment),
                Err(e) => warn!(
                    %quarter,
                    accession = %filing.accession_number,
                    error = %e,
                    "Skipping amendment"
                ),
            }
        }

        let previous = store.load_aggregate(quarter.previous())?;
        let quarters_observed = match self.expected_quarters {
            Some(_) => {
                let mut seen: BTreeSet<Quarter> = store.stored_quarters()?.into_iter().collect();
                seen.insert(quarter);
                Some(seen.len())
            }
            None => None,
        };

        let Some(dataset) = self.build_dataset(
            quarter,
            base,
            base_records,
            amendments,
            &previous,
            quarters_observed,
        ) else {
            info!(%quarter, "No holdings after merging, excluding quarter");
            return Ok(QuarterOutcome::Excluded);
        };

        if dataset.meta.validation_status == ValidationStatus::Fail {
            let details = serde_json::to_string(&dataset.meta.validation_details)?;
            self.alerts.send(
                "13F ingest: validation FAIL",
                &format!("Quarter {quarter}: {details}"),
            );
        }

        if let Some(writer) = &self.artifacts {
            writer.write(&dataset)?;
        }

        let persist_error = match store.replace_quarter(&dataset) {
            Ok(()) => None,
            Err(e) => {
                error!(%quarter, error = %e, "Failed to persist quarter");
                Some(e.to_string())
            }
        };

        Ok(QuarterOutcome::Processed {
            processed: ProcessedQuarter::from(&dataset.meta),
            persist_error,
        })
    }

    async fn load_amendment(&self, filing: &FilingMetadata) -> Result<Amendment> {
        let xml = self.source.fetch_information_table(filing).await?;
        let records = self.parser.parse(&xml, filing)?;
        Ok(Amendment {
            accession_number: filing.accession_number.clone(),
            amendment_type: filing.amendment_type.clone(),
            records,
        })
    }

    /// Compute a quarter from parsed lines. `None` when nothing survives merging.
    pub fn build_dataset(
        &self,
        quarter: Quarter,
        base: &FilingMetadata,
        base_records: Vec<RawHoldingRecord>,
        amendments: Vec<Amendment>,
        previous: &[AggregatedHoldingRecord],
        quarters_observed: Option<usize>,
    ) -> Option<QuarterDataset> {
        let merged = self
            .merger
            .merge(&base.accession_number, base_records, amendments);
        if merged.records.is_empty() {
            return None;
        }

        let resolution = self.resolver.resolve(&merged.records);
        let normalized = normalize(
            quarter,
            &merged.records,
            resolution.multiplier,
            resolution.reason,
        );
        let implied_price_median = normalized.implied_price_median();
        let report = self.validator.validate(&ValidationInput {
            total_value_usd: normalized.total_value_usd,
            weight_sum_pct: normalized.weight_sum_pct,
            implied_price_median,
            quarters_observed,
        });
        let aggregated = aggregate(quarter, &normalized.records, previous);

        info!(
            %quarter,
            holdings = normalized.records.len(),
            securities = aggregated.len(),
            multiplier = resolution.multiplier,
            reason = %resolution.reason,
            total_value_usd = normalized.total_value_usd,
            status = %report.status,
            "Computed quarter"
        );

        let meta = QuarterMeta {
            quarter,
            sec_filing_urls: merged
                .used_accessions
                .iter()
                .map(|acc| archive_folder_url(&self.archives_base_url, &self.cik, acc))
                .collect(),
            used_accessions: merged.used_accessions,
            amendment_types: merged.amendment_types,
            unit_multiplier: resolution.multiplier,
            unit_reason: resolution.reason,
            total_value_usd: normalized.total_value_usd,
            weight_sum_pct: normalized.weight_sum_pct,
            implied_price_median,
            num_holdings: normalized.records.len(),
            validation_status: report.status,
            validation_details: report.checks,
            processed_at: Utc::now(),
        };

        Some(QuarterDataset {
            quarter,
            merged: merged.records,
            normalized: normalized.records,
            aggregated,
            meta,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
