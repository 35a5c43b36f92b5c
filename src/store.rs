//! Persistence gateway for the leak database.
//!
//! All reads and writes go through this module. Writes follow the
//! insert-if-absent discipline: measurements key on the unique timestamp,
//! photos on their identifier, and duplicates are logged and skipped rather
//! than treated as errors. Re-running the pipeline against previously
//! ingested data is therefore always safe.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::Observation;

// ---

/// Open (and create if missing) the SQLite database behind `db_url`.
///
/// Creates the parent directory for file-backed databases and sizes the pool
/// from configuration.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool> {
    // ---
    if let Some(raw) = db_url.strip_prefix("sqlite://") {
        let path = raw.split('?').next().unwrap_or(raw);
        if path != ":memory:" && !path.is_empty() {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
    }

    // Measurements reference cities by bare name and must ingest even for
    // cities missing from the seed list, so FK enforcement stays off.
    let options = SqliteConnectOptions::from_str(db_url)
        .map_err(|e| anyhow!("Invalid database URL '{}': {}", db_url, e))?
        .create_if_missing(true)
        .foreign_keys(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| anyhow!("Failed to connect to database '{}': {}", db_url, e))?;

    Ok(pool)
}

/// Outcome of a batch insert.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Insert observations, skipping any whose timestamp is already present.
///
/// Rows with a NULL timestamp are always inserted: SQL NULLs never compare
/// equal, so they cannot participate in the uniqueness check.
pub async fn insert_observations(
    pool: &SqlitePool,
    observations: &[Observation],
) -> Result<InsertSummary> {
    // ---
    let mut summary = InsertSummary::default();

    for obs in observations {
        if let Some(ts) = &obs.timestamp {
            let present: Option<i64> =
                sqlx::query_scalar("SELECT measurement_id FROM measurements WHERE timestamp = ?1")
                    .bind(ts)
                    .fetch_optional(pool)
                    .await?;

            if present.is_some() {
                info!("Skipping duplicate measurement at {}", ts);
                summary.skipped += 1;
                continue;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO measurements (
                city, methane_level, leak, type_of_infrastructure,
                photo_id, latitude, longitude, volunteer, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&obs.city)
        .bind(obs.methane_level)
        .bind(obs.leak)
        .bind(&obs.type_of_infrastructure)
        .bind(&obs.photo_id)
        .bind(obs.latitude)
        .bind(obs.longitude)
        .bind(&obs.volunteer)
        .bind(&obs.timestamp)
        .execute(pool)
        .await?;

        summary.inserted += 1;
    }

    Ok(summary)
}

/// All photo identifiers currently stored.
pub async fn existing_photo_ids(pool: &SqlitePool) -> Result<HashSet<String>> {
    // ---
    let ids: Vec<String> = sqlx::query_scalar("SELECT photo_id FROM photos")
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Store a photo unless its identifier is already present. Returns whether a
/// row was actually written.
pub async fn insert_photo_if_absent(pool: &SqlitePool, id: &str, bytes: &[u8]) -> Result<bool> {
    // ---
    let result = sqlx::query(
        r#"
        INSERT INTO photos (photo_id, photo) VALUES (?1, ?2)
        ON CONFLICT(photo_id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(bytes)
    .execute(pool)
    .await?;

    let written = result.rows_affected() > 0;
    if written {
        info!("Photo {} inserted ({} bytes)", id, bytes.len());
    } else {
        info!("Photo {} already exists, skipping", id);
    }
    Ok(written)
}

/// All observations recorded for one city.
pub async fn observations_for_city(pool: &SqlitePool, city: &str) -> Result<Vec<Observation>> {
    // ---
    let rows = sqlx::query_as::<_, Observation>(
        r#"
        SELECT city, methane_level, leak, type_of_infrastructure,
               photo_id, latitude, longitude, volunteer, timestamp
        FROM measurements
        WHERE city = ?1
        "#,
    )
    .bind(city)
    .fetch_all(pool)
    .await?;

    debug!("Loaded {} measurements for {}", rows.len(), city);
    Ok(rows)
}

/// Every stored photo, keyed by identifier.
pub async fn load_photos(pool: &SqlitePool) -> Result<HashMap<String, Vec<u8>>> {
    // ---
    let rows: Vec<(String, Vec<u8>)> = sqlx::query_as("SELECT photo_id, photo FROM photos")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Cities that have at least one recorded measurement.
pub async fn distinct_cities(pool: &SqlitePool) -> Result<Vec<String>> {
    // ---
    let cities: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT city FROM measurements ORDER BY city")
            .fetch_all(pool)
            .await?;
    Ok(cities)
}

/// Tabular result of a free-form query.
#[derive(Debug)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Run a free-form SQL query and render every value to text for display.
/// Intended for diagnostics from the command line, not for the pipeline.
pub async fn run_query(pool: &SqlitePool, sql: &str) -> Result<QueryOutput> {
    // ---
    let rows = sqlx::query(sql).fetch_all(pool).await?;

    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        })
        .unwrap_or_default();

    let rendered = rows
        .iter()
        .map(|row| {
            (0..row.columns().len())
                .map(|idx| render_value(row, idx))
                .collect()
        })
        .collect();

    Ok(QueryOutput {
        columns,
        rows: rendered,
    })
}

/// Best-effort text rendering of a single result cell.
fn render_value(row: &SqliteRow, idx: usize) -> String {
    // ---
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(_) => return String::from("?"),
    };
    if raw.is_null() {
        return String::from("NULL");
    }

    match raw.type_info().name() {
        "BOOLEAN" => row
            .try_get::<bool, _>(idx)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| String::from("?")),
        "INTEGER" => row
            .try_get::<i64, _>(idx)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| String::from("?")),
        "REAL" => row
            .try_get::<f64, _>(idx)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| String::from("?")),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|v| format!("<{} bytes>", v.len()))
            .unwrap_or_else(|_| String::from("?")),
        _ => row
            .try_get::<String, _>(idx)
            .unwrap_or_else(|_| String::from("?")),
    }
}
