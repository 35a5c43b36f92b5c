use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use tempfile::TempDir;

// ---

fn methaneflow(args: &[&str], db_url: &str, out_dir: &Path) -> Output {
    // ---
    Command::new(env!("CARGO_BIN_EXE_methaneflow"))
        .args(args)
        .env("DATABASE_URL", db_url)
        .env("MAP_OUT_DIR", out_dir)
        .env("LOG_LEVEL", "warn")
        .env_remove("SHEET_API_URL")
        .output()
        .expect("failed to run methaneflow binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ---

#[test]
fn map_requires_ingested_data() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let db_url = format!("sqlite://{}/leaks.db", dir.path().display());

    let output = methaneflow(&["map", "Portland"], &db_url, dir.path());
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("No measurements ingested yet"),
        "unexpected stderr: {}",
        stderr(&output)
    );
    Ok(())
}

#[test]
fn query_and_map_round_trip() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let db_url = format!("sqlite://{}/leaks.db", dir.path().display());

    // First map attempt fails but leaves the schema (and seeds) behind
    methaneflow(&["map", "Portland"], &db_url, dir.path());

    // Ingest two rows through the query surface: one mappable, one with no
    // coordinates
    let insert_valid = "INSERT INTO measurements \
        (city, methane_level, leak, type_of_infrastructure, latitude, longitude, volunteer, timestamp) \
        VALUES ('Portland', 1000.0, 1, 'gas main', 43.66, -70.25, 'MM', '2024-07-06 14:30:00')";
    let insert_no_coords = "INSERT INTO measurements \
        (city, methane_level, leak, volunteer, timestamp) \
        VALUES ('Portland', 0.0, 0, 'MM', '2024-07-06 15:00:00')";

    for sql in [insert_valid, insert_no_coords] {
        let output = methaneflow(&["query", sql], &db_url, dir.path());
        assert!(output.status.success(), "insert failed: {}", stderr(&output));
        assert!(stdout(&output).contains("no rows were returned"));
    }

    // Rows are visible through a SELECT
    let output = methaneflow(
        &["query", "SELECT city, volunteer FROM measurements ORDER BY timestamp"],
        &db_url,
        dir.path(),
    );
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("city | volunteer"), "unexpected stdout: {text}");
    assert!(text.contains("Portland | MM"));

    // The rendered map plots only the row with valid coordinates and shows
    // the no-photo placeholder
    let output = methaneflow(&["map", "Portland"], &db_url, dir.path());
    assert!(output.status.success(), "map failed: {}", stderr(&output));

    let map_path = dir.path().join("Portland_map.html");
    assert!(map_path.exists());
    let html = std::fs::read_to_string(&map_path)?;
    assert_eq!(html.matches("L.circleMarker").count(), 1);
    assert!(html.contains("No image available"));
    assert!(html.contains("'Leak': leakLayer"));

    Ok(())
}

#[test]
fn unknown_city_lists_alternatives() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let db_url = format!("sqlite://{}/leaks.db", dir.path().display());

    methaneflow(&["map", "Portland"], &db_url, dir.path());
    let insert = "INSERT INTO measurements (city, methane_level, leak, volunteer, timestamp) \
        VALUES ('Portland', 500.0, 1, 'MM', '2024-07-06 16:00:00')";
    let output = methaneflow(&["query", insert], &db_url, dir.path());
    assert!(output.status.success());

    // stdin is closed, so the re-prompt loop terminates after listing cities
    let output = methaneflow(&["map", "Nowhere"], &db_url, dir.path());
    assert!(!output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Requested city not available"), "stdout: {text}");
    assert!(text.contains("Portland"));
    Ok(())
}

#[test]
fn query_renders_blobs_and_nulls() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let db_url = format!("sqlite://{}/leaks.db", dir.path().display());

    methaneflow(&["map", "Portland"], &db_url, dir.path());

    let output = methaneflow(
        &["query", "INSERT INTO photos (photo_id, photo) VALUES ('p1', X'00010203')"],
        &db_url,
        dir.path(),
    );
    assert!(output.status.success(), "insert failed: {}", stderr(&output));

    let output = methaneflow(
        &["query", "SELECT photo_id, photo FROM photos"],
        &db_url,
        dir.path(),
    );
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("p1 | <4 bytes>"), "unexpected stdout: {text}");

    // NULL columns render explicitly
    let output = methaneflow(
        &["query", "SELECT NULL AS \"nothing\""],
        &db_url,
        dir.path(),
    );
    assert!(stdout(&output).contains("NULL"));
    Ok(())
}

#[test]
fn query_accepts_connection_string_override() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let default_url = format!("sqlite://{}/default.db", dir.path().display());
    let other_url = format!("sqlite://{}/other.db", dir.path().display());

    methaneflow(&["map", "Portland"], &other_url, dir.path());

    // DATABASE_URL points at default.db, --db-url wins
    let output = methaneflow(
        &[
            "query",
            "SELECT city FROM cities WHERE city = 'Portland'",
            "--db-url",
            &other_url,
        ],
        &default_url,
        dir.path(),
    );
    assert!(output.status.success(), "query failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Portland"));
    Ok(())
}
