//! Configuration loader for the `methaneflow` pipeline.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// SQLite connection string for the leak database.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Spreadsheet API endpoint returning the survey rows. Only required for
    /// pipeline runs; map rendering and queries work without it.
    pub sheet_url: Option<String>,

    /// Bounded worker count for parallel photo downloads.
    pub fetch_workers: u32,

    /// Per-request timeout for photo downloads, in seconds.
    pub fetch_timeout_secs: u32,

    /// Directory where rendered city maps are written.
    pub map_out_dir: String,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – SQLite connection string
///
/// Optional:
/// - `SHEET_API_URL` – spreadsheet API endpoint (required to run the pipeline)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `FETCH_WORKERS` – parallel photo downloads (default: 10)
/// - `FETCH_TIMEOUT_SECS` – photo download timeout (default: 10)
/// - `MAP_OUT_DIR` – map output directory (default: `html`)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let sheet_url = env::var("SHEET_API_URL").ok().filter(|v| !v.is_empty());
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let fetch_workers = parse_env_u32!("FETCH_WORKERS", 10);
    let fetch_timeout_secs = parse_env_u32!("FETCH_TIMEOUT_SECS", 10);
    let map_out_dir = env::var("MAP_OUT_DIR").unwrap_or_else(|_| "html".to_string());

    Ok(Config {
        db_url,
        db_pool_max,
        sheet_url,
        fetch_workers,
        fetch_timeout_secs,
        map_out_dir,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL       : {}", self.db_url);
        tracing::info!(
            "  SHEET_API_URL      : {}",
            self.sheet_url.as_deref().unwrap_or("(unset)")
        );
        tracing::info!("  DB_POOL_MAX        : {}", self.db_pool_max);
        tracing::info!("  FETCH_WORKERS      : {}", self.fetch_workers);
        tracing::info!("  FETCH_TIMEOUT_SECS : {}", self.fetch_timeout_secs);
        tracing::info!("  MAP_OUT_DIR        : {}", self.map_out_dir);
    }
}
