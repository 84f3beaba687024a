//! Result extraction
//!
//! Converts the post-submission results table into structured records:
//! one map per row, keyed by logical column name, values trimmed, markup
//! discarded. Two paths share the record-building logic: the live DOM
//! (primary) and the out-of-band captured HTML (fallback).

use crate::browser::navigation::escape_selector;
use crate::error::{ExtractionError, Result};
use crate::search::SearchRecord;
use chromiumoxide::Page;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Normalize a header cell into a logical column name: trimmed, lowercased,
/// runs of non-alphanumeric characters collapsed to a single underscore.
pub fn logical_name(header: &str) -> String {
    let mut name = String::with_capacity(header.len());
    let mut last_was_sep = true;
    for c in header.trim().chars() {
        if c.is_alphanumeric() {
            name.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            name.push('_');
            last_was_sep = true;
        }
    }
    while name.ends_with('_') {
        name.pop();
    }
    name
}

#[derive(Debug, Deserialize)]
struct TablePayload {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Build records from header and cell text, in document order.
/// Rows shorter than the header list keep only the cells they have; extra
/// cells without a header are dropped.
fn build_records(headers: &[String], rows: &[Vec<String>]) -> Vec<SearchRecord> {
    let names: Vec<String> = headers.iter().map(|h| logical_name(h)).collect();
    rows.iter()
        .map(|row| {
            let mut fields = BTreeMap::new();
            for (name, cell) in names.iter().zip(row.iter()) {
                if !name.is_empty() {
                    fields.insert(name.clone(), cell.trim().to_string());
                }
            }
            SearchRecord { fields }
        })
        .collect()
}

/// Structured extraction from the results table
pub struct ResultExtractor;

impl ResultExtractor {
    /// Extract records from the live DOM.
    ///
    /// Zero data rows is a valid outcome and yields an empty vec.
    #[instrument(skip(page))]
    pub async fn extract_from_page(page: &Page, table_selector: &str) -> Result<Vec<SearchRecord>> {
        let script = format!(
            r#"
            (() => {{
                const table = document.querySelector('{}');
                if (!table) return null;
                const headerCells = table.querySelectorAll('thead th, thead td');
                let headers = Array.from(headerCells).map(c => c.innerText);
                let rows = Array.from(table.querySelectorAll('tbody tr'));
                if (headers.length === 0) {{
                    const all = Array.from(table.querySelectorAll('tr'));
                    if (all.length > 0) {{
                        headers = Array.from(all[0].querySelectorAll('th, td')).map(c => c.innerText);
                        rows = all.slice(1);
                    }}
                }}
                return {{
                    headers: headers,
                    rows: rows.map(r =>
                        Array.from(r.querySelectorAll('td, th')).map(c => c.innerText))
                }};
            }})()
            "#,
            escape_selector(table_selector)
        );

        let payload: Option<TablePayload> = page
            .evaluate(script.as_str())
            .await
            .map_err(|e| ExtractionError::ExtractionFailed(e.to_string()))?
            .into_value()
            .map_err(|e| ExtractionError::ParsingFailed(e.to_string()))?;

        let payload = payload.ok_or_else(|| {
            ExtractionError::ExtractionFailed(format!("results table {table_selector} not present"))
        })?;

        let records = build_records(&payload.headers, &payload.rows);
        debug!(rows = records.len(), "extracted records from DOM");
        Ok(records)
    }

    /// Extract records from raw HTML with the same normalization as the DOM
    /// path.
    ///
    /// The orchestrator always extracts from the live DOM; results render
    /// after submission and never appear in the captured initial response.
    /// This path serves callers holding raw markup, such as the out-of-band
    /// captured body or archived result pages.
    pub fn extract_from_html(html: &str, table_selector: &str) -> Result<Vec<SearchRecord>> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse(table_selector)
            .map_err(|e| ExtractionError::ParsingFailed(format!("{table_selector}: {e}")))?;
        let table = document.select(&table_sel).next().ok_or_else(|| {
            ExtractionError::ExtractionFailed(format!("results table {table_selector} not present"))
        })?;

        let header_sel = Selector::parse("thead th, thead td").expect("static selector");
        let row_sel = Selector::parse("tbody tr").expect("static selector");
        let any_row_sel = Selector::parse("tr").expect("static selector");
        let cell_sel = Selector::parse("td, th").expect("static selector");

        let mut headers: Vec<String> = table
            .select(&header_sel)
            .map(|c| c.text().collect::<String>())
            .collect();

        let rows: Vec<Vec<String>> = if headers.is_empty() {
            let mut all = table.select(&any_row_sel);
            headers = all
                .next()
                .map(|r| {
                    r.select(&cell_sel)
                        .map(|c| c.text().collect::<String>())
                        .collect()
                })
                .unwrap_or_default();
            all.map(|r| {
                r.select(&cell_sel)
                    .map(|c| c.text().collect::<String>())
                    .collect()
            })
            .collect()
        } else {
            table
                .select(&row_sel)
                .map(|r| {
                    r.select(&cell_sel)
                        .map(|c| c.text().collect::<String>())
                        .collect()
                })
                .collect()
        };

        let records = build_records(&headers, &rows);
        debug!(rows = records.len(), "extracted records from captured HTML");
        Ok(records)
    }
}
