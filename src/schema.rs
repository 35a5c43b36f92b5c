//! Database schema management for `methaneflow`.
//!
//! Ensures required tables and indexes exist before any pipeline work, and
//! seeds the reference tables (cities, utility providers, volunteers) from
//! static data. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::SqlitePool;

// ---

/// Static reference data: `(city, county, state, utility_provider)`.
const CITY_SEED: &[(&str, &str, &str, &str)] = &[
    ("Portland", "Cumberland", "MAINE", "Unitil"),
    ("South Portland", "Cumberland", "MAINE", "Unitil"),
    ("Westbrook", "Cumberland", "MAINE", "Unitil"),
    ("Brunswick", "Cumberland", "MAINE", "Maine Natural Gas"),
    ("Bangor", "Penobscot", "MAINE", "Bangor Natural Gas"),
    ("Augusta", "Kennebec", "MAINE", "Summit Natural Gas of Maine"),
    ("Lewiston", "Androscoggin", "MAINE", "Unitil"),
];

/// Static reference data: `(company_name, mailing_address, phone_number, region)`.
const PROVIDER_SEED: &[(&str, &str, &str, &str)] = &[
    (
        "Unitil",
        "PO Box 981077, Boston, MA 02298-1077",
        "1-866-933-3821",
        "Southern Maine",
    ),
    (
        "Bangor Natural Gas",
        "498 Maine Ave, Bangor, ME 04401",
        "1-877-459-4427",
        "Penobscot Valley",
    ),
    (
        "Summit Natural Gas of Maine",
        "5 Industrial Park Rd, Augusta, ME 04330",
        "1-800-909-7642",
        "Kennebec Valley",
    ),
    (
        "Maine Natural Gas",
        "54 Crusher Rd, Brunswick, ME 04011",
        "1-207-729-0420",
        "Midcoast",
    ),
];

/// Static reference data: `(first_name, last_name, city, initials)`.
const VOLUNTEER_SEED: &[(&str, &str, &str, &str)] =
    &[("Michael", "Massone", "Portland", "MM")];

/// Create or update the database schema (idempotent).
///
/// Creates the five project tables and the city index, then seeds the
/// reference tables with the same insert-if-absent discipline the pipeline
/// uses for measurements. Safe to call on every startup; no-op for objects
/// and seed rows that already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS utility_providers (
            provider_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            company_name    TEXT UNIQUE,
            mailing_address TEXT,
            phone_number    TEXT,
            region          TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cities (
            city_id          INTEGER PRIMARY KEY AUTOINCREMENT,
            city             TEXT UNIQUE,
            county           TEXT,
            state            TEXT DEFAULT 'MAINE',
            utility_provider TEXT,
            FOREIGN KEY (utility_provider) REFERENCES utility_providers(company_name)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            photo_id TEXT PRIMARY KEY,
            photo    BLOB
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Core table for transformed survey rows. The unique timestamp is the
    // idempotency key for repeated pipeline runs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            measurement_id         INTEGER PRIMARY KEY AUTOINCREMENT,
            city                   TEXT,
            methane_level          REAL,
            leak                   BOOLEAN,
            type_of_infrastructure TEXT,
            photo_id               TEXT,
            latitude               REAL,
            longitude              REAL,
            volunteer              TEXT,
            timestamp              TIMESTAMP UNIQUE,
            FOREIGN KEY (city) REFERENCES cities(city),
            FOREIGN KEY (photo_id) REFERENCES photos(photo_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS volunteers (
            volunteer_id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name   TEXT,
            last_name    TEXT,
            city         TEXT,
            initials     TEXT,
            FOREIGN KEY (city) REFERENCES cities(city)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Map rendering always filters by city
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measurements_city
            ON measurements (city);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    seed_reference_data(pool).await?;
    Ok(())
}

/// Insert-if-absent seeding of the reference tables.
async fn seed_reference_data(pool: &SqlitePool) -> Result<()> {
    // ---
    for (company, address, phone, region) in PROVIDER_SEED {
        sqlx::query(
            r#"
            INSERT INTO utility_providers (company_name, mailing_address, phone_number, region)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(company_name) DO NOTHING
            "#,
        )
        .bind(company)
        .bind(address)
        .bind(phone)
        .bind(region)
        .execute(pool)
        .await?;
    }

    for (city, county, state, provider) in CITY_SEED {
        sqlx::query(
            r#"
            INSERT INTO cities (city, county, state, utility_provider)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(city) DO NOTHING
            "#,
        )
        .bind(city)
        .bind(county)
        .bind(state)
        .bind(provider)
        .execute(pool)
        .await?;
    }

    // volunteers has no unique constraint; check before inserting
    for (first, last, city, initials) in VOLUNTEER_SEED {
        let present: Option<i64> = sqlx::query_scalar(
            "SELECT volunteer_id FROM volunteers WHERE initials = ?1 AND city = ?2",
        )
        .bind(initials)
        .bind(city)
        .fetch_optional(pool)
        .await?;

        if present.is_none() {
            sqlx::query(
                r#"
                INSERT INTO volunteers (first_name, last_name, city, initials)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(first)
            .bind(last)
            .bind(city)
            .bind(initials)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
