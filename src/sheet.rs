//! Spreadsheet API fetcher.
//!
//! The survey lives in a shared spreadsheet whose API returns the selected
//! range as JSON: `{"values": [[header, ...], [cell, ...], ...]}`. The first
//! inner array is the header row; everything after it is data. Cells are
//! always text at this stage; typing happens in the transformer.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::RawBatch;

// ---

/// Fetch the survey range and shape it into a [`RawBatch`].
pub async fn fetch_rows(url: &str) -> Result<RawBatch> {
    // ---
    tracing::debug!("Fetching sheet rows from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let response: Value = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let batch = batch_from_values(&response)?;
    tracing::info!(
        "Fetched {} rows ({} columns) from sheet",
        batch.len(),
        batch.headers.len()
    );
    Ok(batch)
}

/// Shape the spreadsheet API payload into a header row plus padded data rows.
///
/// Short rows are padded with empty cells (the API omits trailing blanks) and
/// long rows are truncated to the header width.
fn batch_from_values(response: &Value) -> Result<RawBatch> {
    // ---
    let values = response
        .get("values")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("Sheet response missing 'values' array"))?;

    let mut records = values.iter().map(row_cells);

    let headers = records
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow!("Sheet response contained no header row"))?;

    let width = headers.len();
    let rows = records
        .map(|mut cells| {
            cells.resize(width, String::new());
            cells
        })
        .collect();

    Ok(RawBatch { headers, rows })
}

fn row_cells(row: &Value) -> Vec<String> {
    // ---
    row.as_array()
        .map(|cells| {
            cells
                .iter()
                .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string()))
                .collect()
        })
        .unwrap_or_default()
}
