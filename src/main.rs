//! Command-line entry point for the `methaneflow` pipeline.
//!
//! This binary orchestrates the full startup sequence for the methane leak
//! survey tooling, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Opening the SQLite connection pool
//! - Creating the database schema (and seed data) if it does not exist
//! - Dispatching the requested subcommand: pipeline run, map render, or query
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – SQLite connection string
//! - `SHEET_API_URL` (optional) – spreadsheet endpoint, required for `run`
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `FETCH_WORKERS` / `FETCH_TIMEOUT_SECS` (optional) – photo download knobs
//! - `MAP_OUT_DIR` (optional) – map output directory (default: `html`)
//! - `LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! Schema setup is delegated to `schema`, configuration parsing to `config`,
//! and the subcommand bodies to `pipeline`, `render`, and `store`.
use std::io::{IsTerminal, Write};
use std::{env, io};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod config;
mod coords;
mod images;
mod models;
mod pipeline;
mod render;
mod schema;
mod sheet;
mod store;
mod transform;

pub use config::Config;

// These are not used here but they are imported to be used by the sibling
// modules, that way refactoring is easier since the modules do not need
// knowledge of models.rs, only of their parent module (main.rs)
pub use models::{Observation, RawBatch};

// ---

/// Command-line arguments for methaneflow
#[derive(Parser, Debug)]
#[command(name = "methaneflow")]
#[command(about = "Methane leak survey pipeline and mapper")]
#[command(version)]
struct Cli {
    // ---
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full fetch → transform → load batch
    Run,
    /// Render the interactive leak map for a city
    Map {
        /// The city to map
        city: String,
    },
    /// Execute a free-form SQL query against the leak database
    Query {
        /// SQL query to execute
        sql: String,
        /// Database connection string (defaults to DATABASE_URL)
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cli = Cli::parse();
    let cfg = config::load_from_env()?;
    cfg.log_config();

    match cli.command {
        Command::Run => {
            // ---
            let pool = store::connect(&cfg.db_url, cfg.db_pool_max).await?;
            schema::create_schema(&pool).await?;
            pipeline::run(&pool, &cfg).await?;
        }
        Command::Map { city } => {
            // ---
            let pool = store::connect(&cfg.db_url, cfg.db_pool_max).await?;
            schema::create_schema(&pool).await?;
            let city = resolve_city(&pool, &city).await?;
            let path = render::render_city_map(&pool, &city, &cfg.map_out_dir).await?;
            println!("Map written to {}", path.display());
        }
        Command::Query { sql, db_url } => {
            // ---
            let url = db_url.unwrap_or_else(|| cfg.db_url.clone());
            let pool = store::connect(&url, cfg.db_pool_max).await?;
            let output = store::run_query(&pool, &sql).await?;
            print_query_output(&output);
        }
    }

    Ok(())
}

// ---

/// Validate the requested city against the cities that actually have
/// measurements, re-prompting interactively until a valid one is chosen.
async fn resolve_city(pool: &sqlx::SqlitePool, requested: &str) -> Result<String> {
    // ---
    let cities = store::distinct_cities(pool).await?;
    if cities.is_empty() {
        bail!("No measurements ingested yet; run the pipeline first");
    }

    let mut city = requested.trim().to_string();
    while !cities.iter().any(|c| c == &city) {
        println!("Requested city not available. Please choose from the following list:");
        for c in &cities {
            println!("  {c}");
        }
        print!("Enter city name: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            bail!("No city selected");
        }
        city = line.trim().to_string();
    }

    tracing::info!("Proceeding with city: {}", city);
    Ok(city)
}

/// Print a query result as simple pipe-separated rows.
fn print_query_output(output: &store::QueryOutput) {
    // ---
    if output.columns.is_empty() {
        println!("Query executed successfully, but no rows were returned.");
        return;
    }

    println!("{}", output.columns.join(" | "));
    for row in &output.rows {
        println!("{}", row.join(" | "));
    }
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
