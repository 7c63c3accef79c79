//! Shared fixtures for pipeline tests.

use chrono::{NaiveDate, TimeZone, Utc};
use holdings_analytics::{aggregate, normalize, ValidationInput, Validator};
use holdings_core::{
    FilingMetadata, PutCall, Quarter, QuarterDataset, QuarterMeta, RawHoldingRecord, UnitReason,
    FORM_HOLDINGS_AMENDMENT, FORM_HOLDINGS_REPORT,
};

pub(crate) const CIK: &str = "0001067983";

pub(crate) fn filing(
    accession: &str,
    quarter: Quarter,
    filed: NaiveDate,
    amendment_type: Option<&str>,
) -> FilingMetadata {
    FilingMetadata {
        accession_number: accession.to_string(),
        form_type: if amendment_type.is_some() {
            FORM_HOLDINGS_AMENDMENT
        } else {
            FORM_HOLDINGS_REPORT
        }
        .to_string(),
        filing_date: filed,
        period_of_report: quarter.end_date(),
        amendment_type: amendment_type.map(str::to_string),
        primary_document: "primary_doc.xml".to_string(),
    }
}

/// Information table XML for `(issuer, cusip, value_raw, shares)` lines.
pub(crate) fn info_table(lines: &[(&str, &str, i64, i64)]) -> Vec<u8> {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<informationTable xmlns="http://www.sec.gov/edgar/document/thirteenf/informationtable">"#,
    );
    for (issuer, cusip, value, shares) in lines {
        xml.push_str(&format!(
            "<infoTable><nameOfIssuer>{issuer}</nameOfIssuer><titleOfClass>COM</titleOfClass>\
             <cusip>{cusip}</cusip><value>{value}</value><shrsOrPrnAmt><sshPrnamt>{shares}</sshPrnamt>\
             <sshPrnamtType>SH</sshPrnamtType></shrsOrPrnAmt>\
             <investmentDiscretion>DFND</investmentDiscretion></infoTable>"
        ));
    }
    xml.push_str("</informationTable>");
    xml.into_bytes()
}

pub(crate) fn raw(accession: &str, cusip: &str, issuer: &str, value_raw: i64, shares: i64) -> RawHoldingRecord {
    RawHoldingRecord {
        accession_number: accession.to_string(),
        cik: CIK.to_string(),
        period_of_report: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        filed_date: NaiveDate::from_ymd_opt(2025, 2, 14).unwrap(),
        form_type: FORM_HOLDINGS_REPORT.to_string(),
        amendment_type: None,
        issuer_name: issuer.to_string(),
        cusip: cusip.to_string(),
        value_raw,
        shares,
        share_type: "SH".to_string(),
        put_call: None,
        investment_discretion: "DFND".to_string(),
        row_index: 0,
    }
}

/// A small quarter in thousands that passes every check.
pub(crate) fn sample_dataset(quarter: Quarter) -> QuarterDataset {
    let mut option_line = raw("0000950123250001", "037833100", "APPLE INC", 10_000_000, 100_000_000);
    option_line.put_call = Some(PutCall::Call);
    let merged = vec![
        raw("0000950123250001", "037833100", "APPLE INC", 60_000_000, 600_000_000),
        raw("0000950123250001", "060505104", "BANK AMER CORP", 30_000_000, 300_000_000),
        option_line,
    ];

    let normalized = normalize(
        quarter,
        &merged,
        1000,
        UnitReason::ThousandsByTotalAndImpliedPrice,
    );
    let report = Validator::default().validate(&ValidationInput {
        total_value_usd: normalized.total_value_usd,
        weight_sum_pct: normalized.weight_sum_pct,
        implied_price_median: normalized.implied_price_median(),
        quarters_observed: None,
    });
    let aggregated = aggregate(quarter, &normalized.records, &[]);

    let meta = QuarterMeta {
        quarter,
        used_accessions: vec!["0000950123250001".to_string()],
        amendment_types: vec![FORM_HOLDINGS_REPORT.to_string()],
        unit_multiplier: 1000,
        unit_reason: UnitReason::ThousandsByTotalAndImpliedPrice,
        total_value_usd: normalized.total_value_usd,
        weight_sum_pct: normalized.weight_sum_pct,
        implied_price_median: normalized.implied_price_median(),
        num_holdings: normalized.records.len(),
        validation_status: report.status,
        validation_details: report.checks,
        sec_filing_urls: vec![
            "https://www.sec.gov/Archives/edgar/data/1067983/0000950123250001/".to_string(),
        ],
        processed_at: Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap(),
    };

    QuarterDataset {
        quarter,
        merged,
        normalized: normalized.records,
        aggregated,
        meta,
    }
}
