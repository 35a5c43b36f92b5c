//! End-to-end ETL batch run: fetch → transform → load.
//!
//! Each stage is logged; a validation or store failure aborts the run before
//! anything is persisted, while per-row parse problems and per-photo download
//! failures degrade only the affected fields.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::{sheet, store, transform, Config};

// ---

/// Run one full pipeline batch against the shared store.
pub async fn run(pool: &SqlitePool, config: &Config) -> Result<()> {
    // ---
    info!("Pipeline run - starting");

    let sheet_url = config
        .sheet_url
        .as_deref()
        .ok_or_else(|| anyhow!("SHEET_API_URL must be set in .env or environment to run the pipeline"))?;

    // Step 1: fetch raw rows from the sheet
    debug!("Pipeline run - Step 1");
    let batch = sheet::fetch_rows(sheet_url)
        .await
        .context("Failed to fetch sheet rows")?;

    // Step 2: transform (field normalization + photo resolution)
    debug!("Pipeline run - Step 2");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch_timeout_secs as u64))
        .build()
        .context("Failed to build HTTP client")?;

    let observations =
        transform::transform_batch(pool, &client, &batch, config.fetch_workers as usize)
            .await
            .context("Failed to transform batch")?;

    // Step 3: load into the measurements table
    debug!("Pipeline run - Step 3");
    let summary = store::insert_observations(pool, &observations)
        .await
        .context("Failed to load measurements")?;

    info!(
        "Pipeline complete: {} rows fetched, {} inserted, {} duplicates skipped",
        batch.len(),
        summary.inserted,
        summary.skipped
    );
    Ok(())
}
