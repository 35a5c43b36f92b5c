//! Row normalization for the survey batch.
//!
//! Turns the freeform text rows from the sheet into typed [`Observation`]s:
//! timestamp canonicalization, coordinate decomposition, LEL→PPM conversion,
//! leak classification, volunteer normalization, and photo-link resolution.
//! Field-level parse failures (coordinates, timestamps) null the field and
//! keep the row. Structural problems (a missing required column, a
//! non-numeric methane level) abort the whole batch before any measurement
//! is persisted.

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use reqwest::Client;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{coords, images, Observation, RawBatch};

// ---

/// Methane concentration at 100% of the Lower Explosive Limit. Fixed domain
/// knowledge, not configurable.
const METHANE_LEL_PPM: f64 = 50_000.0;

/// Columns the sheet must provide for a batch to be processable at all.
const REQUIRED_COLUMNS: [&str; 5] = [
    "coordinates",
    "photo",
    "methane_level",
    "volunteer",
    "timestamp",
];

/// Convert a Lower Explosive Limit percentage to parts per million.
pub fn lel_to_ppm(lel_percent: f64) -> f64 {
    lel_percent * METHANE_LEL_PPM * 0.01
}

/// Canonicalize a `MM/DD/YYYY HH:MM:SS` timestamp to `YYYY-MM-DD HH:MM:SS`.
/// Unparseable input becomes `None`; the row is kept either way.
pub fn canonical_timestamp(raw: &str) -> Option<String> {
    // ---
    NaiveDateTime::parse_from_str(raw.trim(), "%m/%d/%Y %H:%M:%S")
        .ok()
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// A row after the pure field transforms, with its photo link still pending
/// resolution.
#[derive(Debug)]
struct ShapedRow {
    // ---
    city: String,
    methane_level: f64,
    leak: bool,
    type_of_infrastructure: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    volunteer: String,
    timestamp: Option<String>,
    photo_link: String,
}

/// Apply every per-row transform that needs no I/O. Fails fast so nothing is
/// fetched or persisted for a batch that cannot be fully typed.
fn shape_rows(batch: &RawBatch) -> Result<Vec<ShapedRow>> {
    // ---
    for column in REQUIRED_COLUMNS {
        if batch.column(column).is_none() {
            bail!("Missing required column: {column}");
        }
    }

    let mut shaped = Vec::with_capacity(batch.len());
    for row in 0..batch.len() {
        // ---
        let raw_level = batch.field(row, "methane_level").trim().to_string();
        let lel: f64 = match raw_level.parse() {
            Ok(v) => v,
            Err(_) => bail!("Row {}: invalid methane_level '{}'", row + 1, raw_level),
        };
        let methane_level = lel_to_ppm(lel);

        let timestamp = canonical_timestamp(batch.field(row, "timestamp"));
        if timestamp.is_none() {
            warn!(
                "Row {}: unparseable timestamp '{}'",
                row + 1,
                batch.field(row, "timestamp")
            );
        }

        let (latitude, longitude) = match coords::parse_coordinates(batch.field(row, "coordinates"))
        {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => {
                warn!(
                    "Row {}: unparseable coordinates '{}'",
                    row + 1,
                    batch.field(row, "coordinates")
                );
                (None, None)
            }
        };

        let infrastructure = batch.field(row, "type_of_infrastructure").trim();

        shaped.push(ShapedRow {
            city: batch.field(row, "city").trim().to_string(),
            methane_level,
            leak: methane_level > 0.0,
            type_of_infrastructure: (!infrastructure.is_empty())
                .then(|| infrastructure.to_string()),
            latitude,
            longitude,
            volunteer: batch.field(row, "volunteer").trim().to_uppercase(),
            timestamp,
            photo_link: batch.field(row, "photo").trim().to_string(),
        });
    }

    Ok(shaped)
}

/// Transform a raw batch into persistable observations.
///
/// Photo resolution runs last, after every field transform has succeeded, so
/// a batch that fails validation never touches the network or the photo
/// store.
pub async fn transform_batch(
    pool: &SqlitePool,
    client: &Client,
    batch: &RawBatch,
    fetch_workers: usize,
) -> Result<Vec<Observation>> {
    // ---
    let shaped = shape_rows(batch)?;
    info!("Shaped {} rows", shaped.len());

    let links: Vec<String> = shaped.iter().map(|r| r.photo_link.clone()).collect();
    let photo_ids = images::resolve_photos(pool, client, &links, fetch_workers).await?;

    Ok(shaped
        .into_iter()
        .zip(photo_ids)
        .map(|(row, photo_id)| Observation {
            city: row.city,
            methane_level: row.methane_level,
            leak: row.leak,
            type_of_infrastructure: row.type_of_infrastructure,
            photo_id,
            latitude: row.latitude,
            longitude: row.longitude,
            volunteer: row.volunteer,
            timestamp: row.timestamp,
        })
        .collect())
}
