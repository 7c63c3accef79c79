//! Information-table parsing.
//!
//! Converts one filing's XML information table into raw holding lines. Element
//! names are matched by local name, ignoring case, so namespaced and bare
//! documents read the same way.

use holdings_core::{Error, FilingMetadata, PutCall, RawHoldingRecord, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::debug;

const ENTRY_TAG: &str = "infotable";

/// Parser for information-table documents of one reporting entity.
pub struct InfoTableParser {
    /// Reporting-entity identifier stamped on every line.
    cik: String,
}

impl InfoTableParser {
    /// Create a parser for the given reporting entity.
    pub fn new(cik: impl Into<String>) -> Self {
        Self { cik: cik.into() }
    }

    /// Parse a document into raw lines, in document order.
    ///
    /// A well-formed document without entries yields an empty vector.
    pub fn parse(&self, xml: &[u8], filing: &FilingMetadata) -> Result<Vec<RawHoldingRecord>> {
        let accession = filing.accession_number.replace('-', "");
        let mut reader = Reader::from_reader(xml);

        let mut buf = Vec::new();
        let mut entry: Option<HashMap<String, String>> = None;
        // Leaf element being read and the text gathered inside it so far.
        let mut field: Option<(String, String)> = None;
        let mut records = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = local_name(e.local_name().as_ref());
                    if name == ENTRY_TAG {
                        entry = Some(HashMap::new());
                        field = None;
                    } else if let Some(fields) = entry.as_mut() {
                        if let Some((outer, text)) = field.replace((name, String::new())) {
                            insert_first(fields, &outer, &text);
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some((_, text)) = field.as_mut() {
                        let chunk = t
                            .unescape()
                            .map_err(|e| Error::parse(format!("{accession}: {e}")))?;
                        text.push_str(&chunk);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some((_, text)) = field.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::End(e)) => {
                    if let (Some(fields), Some((name, text))) = (entry.as_mut(), field.take()) {
                        insert_first(fields, &name, &text);
                    }
                    if local_name(e.local_name().as_ref()) == ENTRY_TAG {
                        if let Some(fields) = entry.take() {
                            let row_index = records.len();
                            records.push(self.build_record(&fields, &accession, filing, row_index));
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::parse(format!(
                        "{accession}: malformed XML at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        debug!(accession = %accession, rows = records.len(), "parsed information table");
        Ok(records)
    }

    fn build_record(
        &self,
        fields: &HashMap<String, String>,
        accession: &str,
        filing: &FilingMetadata,
        row_index: usize,
    ) -> RawHoldingRecord {
        let text = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let non_blank = |key: &str, default: &str| {
            fields
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        RawHoldingRecord {
            accession_number: accession.to_string(),
            cik: self.cik.clone(),
            period_of_report: filing.period_of_report,
            filed_date: filing.filing_date,
            form_type: filing.form_type.clone(),
            amendment_type: filing.amendment_type.clone(),
            issuer_name: text("nameofissuer"),
            cusip: text("cusip"),
            value_raw: int_field(fields, "value"),
            shares: int_field(fields, "sshprnamt"),
            share_type: non_blank("sshprnamttype", "SH"),
            put_call: fields.get("putcall").and_then(|v| PutCall::parse_optional(v)),
            investment_discretion: non_blank("investmentdiscretion", "SOLE"),
            row_index,
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn insert_first(fields: &mut HashMap<String, String>, name: &str, text: &str) {
    let value = text.trim();
    if !value.is_empty() {
        fields.entry(name.to_string()).or_insert_with(|| value.to_string());
    }
}

/// Integer with optional thousands separators; anything else reads as 0.
fn int_field(fields: &HashMap<String, String>, key: &str) -> i64 {
    fields
        .get(key)
        .and_then(|v| v.replace(',', "").parse::<i64>().ok())
        .unwrap_or(0)
}
