//! Filing source boundary.
//!
//! `FilingSource` is what the pipeline consumes; `EdgarClient` implements it
//! against the public filing archive with a shared rate limit and retry policy.

use async_trait::async_trait;
use chrono::NaiveDate;
use holdings_core::config::EdgarConfig;
use holdings_core::{
    Error, FilingMetadata, Result, FORM_HOLDINGS_AMENDMENT, FORM_HOLDINGS_REPORT,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::retry::{RateLimiter, RetryPolicy};

/// Source of filing listings and information-table documents.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// All quarterly holdings filings, optionally only those filed on or after `since`.
    async fn list_filings(&self, since: Option<NaiveDate>) -> Result<Vec<FilingMetadata>>;

    /// Raw information-table XML for one filing.
    async fn fetch_information_table(&self, filing: &FilingMetadata) -> Result<Vec<u8>>;
}

/// Archive folder of a filing, e.g. `https://www.sec.gov/Archives/edgar/data/1067983/000095012324011775/`.
pub fn archive_folder_url(archives_base_url: &str, cik: &str, accession: &str) -> String {
    format!(
        "{}/Archives/edgar/data/{}/{}/",
        archives_base_url.trim_end_matches('/'),
        cik_without_padding(cik),
        accession.replace('-', "")
    )
}

fn cik_without_padding(cik: &str) -> &str {
    let trimmed = cik.trim().trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

/// HTTP client for the filing archive.
pub struct EdgarClient {
    http: reqwest::Client,
    config: EdgarConfig,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl EdgarClient {
    /// Build a client from configuration.
    pub fn new(config: &EdgarConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            return Err(Error::config("a contact User-Agent is required"));
        }
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            config: config.clone(),
            limiter: RateLimiter::new(config.requests_per_second)?,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    /// GET a URL through the rate limiter and retry policy.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.retry
            .attempt(url, || async move {
                self.limiter.acquire().await;
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| Error::fetch(format!("{url}: {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Http {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Error::fetch(format!("{url}: {e}")))?;
                Ok(body.to_vec())
            })
            .await
    }

    fn submissions_url(&self) -> String {
        let digits = self.config.cik.trim().trim_start_matches('0');
        format!(
            "{}/submissions/CIK{:0>10}.json",
            self.config.data_base_url.trim_end_matches('/'),
            digits
        )
    }

    fn folder_url(&self, accession: &str) -> String {
        archive_folder_url(&self.config.archives_base_url, &self.config.cik, accession)
    }
}

#[async_trait]
impl FilingSource for EdgarClient {
    async fn list_filings(&self, since: Option<NaiveDate>) -> Result<Vec<FilingMetadata>> {
        let url = self.submissions_url();
        let body = self.get_bytes(&url).await?;
        let submissions: Submissions = serde_json::from_slice(&body)?;
        let recent = submissions
            .filings
            .map(|f| f.recent)
            .or(submissions.recent)
            .unwrap_or_default();
        let filings = filings_from_recent(&recent, since);
        info!(cik = %self.config.cik, count = filings.len(), "listed holdings filings");
        Ok(filings)
    }

    async fn fetch_information_table(&self, filing: &FilingMetadata) -> Result<Vec<u8>> {
        let folder = self.folder_url(&filing.accession_number);
        let index_body = self.get_bytes(&format!("{folder}index.json")).await?;
        let index: FilingIndex = serde_json::from_slice(&index_body)?;
        let names: Vec<String> = index.directory.item.into_iter().map(|i| i.name).collect();

        let name = find_information_table(&names).ok_or_else(|| {
            Error::data(format!(
                "no information table in index for {}",
                filing.accession_number
            ))
        })?;
        debug!(accession = %filing.accession_number, file = name, "downloading information table");
        self.get_bytes(&format!("{folder}{name}")).await
    }
}

/// Submissions document; `recent` is columnar.
#[derive(Debug, Deserialize)]
struct Submissions {
    #[serde(default)]
    filings: Option<SubmissionFilings>,
    #[serde(default)]
    recent: Option<RecentFilings>,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    #[serde(default)]
    recent: RecentFilings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RecentFilings {
    accession_number: Vec<String>,
    form: Vec<String>,
    filing_date: Vec<String>,
    report_date: Vec<String>,
    primary_document: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FilingIndex {
    directory: IndexDirectory,
}

#[derive(Debug, Deserialize)]
struct IndexDirectory {
    #[serde(default)]
    item: Vec<IndexItem>,
}

#[derive(Debug, Deserialize)]
struct IndexItem {
    #[serde(default)]
    name: String,
}

/// Rows of the columnar listing that are holdings reports, filed on or after `since`.
///
/// Rows without a parsable filing or report date are dropped.
fn filings_from_recent(recent: &RecentFilings, since: Option<NaiveDate>) -> Vec<FilingMetadata> {
    fn column(col: &[String], i: usize) -> &str {
        col.get(i).map(String::as_str).unwrap_or("")
    }
    let mut filings = Vec::new();

    for (i, accession) in recent.accession_number.iter().enumerate() {
        let form = column(&recent.form, i);
        if form != FORM_HOLDINGS_REPORT && form != FORM_HOLDINGS_AMENDMENT {
            continue;
        }
        let filed = NaiveDate::parse_from_str(column(&recent.filing_date, i), "%Y-%m-%d");
        let period = NaiveDate::parse_from_str(column(&recent.report_date, i), "%Y-%m-%d");
        let (Ok(filing_date), Ok(period_of_report)) = (filed, period) else {
            debug!(accession = %accession, "skipping filing without usable dates");
            continue;
        };
        if since.is_some_and(|s| filing_date < s) {
            continue;
        }
        filings.push(FilingMetadata {
            accession_number: accession.replace('-', ""),
            form_type: form.to_string(),
            filing_date,
            period_of_report,
            amendment_type: None,
            primary_document: column(&recent.primary_document, i).to_string(),
        });
    }
    filings
}

/// Pick the information-table XML from a filing folder listing.
fn find_information_table(names: &[String]) -> Option<&str> {
    let xml: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| n.to_ascii_lowercase().ends_with(".xml"))
        .collect();

    if let Some(named) = xml.iter().copied().find(|n| {
        let lower = n.to_ascii_lowercase();
        lower.contains("infotable") || lower.contains("informationtable")
    }) {
        return Some(named);
    }

    let candidates: Vec<&str> = xml
        .into_iter()
        .filter(|n| !n.to_ascii_lowercase().contains("index"))
        .collect();
    candidates
        .iter()
        .find(|n| **n != "primary_doc.xml" && n.starts_with(|c: char| c.is_ascii_digit()))
        .or_else(|| candidates.iter().find(|n| **n == "primary_doc.xml"))
        .or_else(|| candidates.first())
        .copied()
}
