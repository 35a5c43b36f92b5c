//! Photo retrieval for survey rows.
//!
//! Each row carries a share-link whose identifying token (the substring after
//! the first `=`) doubles as the photo's primary key. Identifiers already in
//! the store are reused without any network I/O; the rest are downloaded in
//! parallel through a bounded worker pool and inserted once each. A failed
//! download only costs the affected rows their photo reference; the batch
//! keeps going.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::store;

// ---

/// Derive the stable photo identifier from a share-link: the substring
/// following the first `=`. Links without an `=` (or empty links) carry no
/// identifier.
pub fn photo_token(link: &str) -> Option<String> {
    // ---
    link.split_once('=')
        .map(|(_, token)| token.to_string())
        .filter(|t| !t.is_empty())
}

/// Direct-download URL for a share-link token.
fn download_url(token: &str) -> String {
    format!("https://drive.google.com/uc?export=download&id={token}")
}

/// Resolve one photo link per row into a stored photo id.
///
/// Returns a vector parallel to `links`: `Some(photo_id)` when the photo is in
/// the store after this call (pre-existing or freshly downloaded), `None` when
/// the link was empty/malformed or the download failed.
pub async fn resolve_photos(
    pool: &SqlitePool,
    client: &Client,
    links: &[String],
    workers: usize,
) -> Result<Vec<Option<String>>> {
    // ---
    let tokens: Vec<Option<String>> = links
        .iter()
        .map(|link| {
            let token = photo_token(link);
            if token.is_none() && !link.trim().is_empty() {
                debug!("No photo identifier in link: {}", link);
            }
            token
        })
        .collect();

    let existing = store::existing_photo_ids(pool).await?;

    // Distinct identifiers not yet stored; a link shared by several rows is
    // fetched at most once.
    let distinct: HashSet<&String> = tokens.iter().flatten().collect();
    let to_fetch: Vec<String> = distinct
        .iter()
        .filter(|t| !existing.contains(t.as_str()))
        .map(|t| t.to_string())
        .collect();

    info!(
        "Resolving {} distinct photo identifiers: {} already stored, {} to download",
        distinct.len(),
        distinct.len() - to_fetch.len(),
        to_fetch.len()
    );

    let results: Vec<(String, Result<Vec<u8>>)> = stream::iter(to_fetch.into_iter().map(|id| {
        let client = client.clone();
        async move {
            let result = fetch_one(&client, &id).await;
            (id, result)
        }
    }))
    .buffer_unordered(workers.max(1))
    .collect()
    .await;

    let mut stored: HashMap<String, bool> = HashMap::new();
    for (id, result) in results {
        match result {
            Ok(bytes) => {
                store::insert_photo_if_absent(pool, &id, &bytes).await?;
                stored.insert(id, true);
            }
            Err(e) => {
                error!("Failed to download photo {}: {}", id, e);
                stored.insert(id, false);
            }
        }
    }

    Ok(tokens
        .into_iter()
        .map(|token| {
            token.filter(|t| existing.contains(t) || stored.get(t).copied().unwrap_or(false))
        })
        .collect())
}

/// Download a single photo, failing on any non-success status.
async fn fetch_one(client: &Client, id: &str) -> Result<Vec<u8>> {
    // ---
    let url = download_url(id);
    debug!("Downloading photo {} from {}", id, url);

    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(anyhow!("HTTP status {}", response.status()));
    }

    let bytes = response.bytes().await?;
    debug!("Photo {} downloaded ({} bytes)", id, bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_token_after_first_equals() {
        // ---
        assert_eq!(
            photo_token("https://drive.google.com/open?id=abc123"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_token_keeps_rest_of_query() {
        // ---
        // Everything after the *first* '=' is the token, by contract.
        assert_eq!(
            photo_token("https://example.com/share?id=abc&x=1"),
            Some("abc&x=1".to_string())
        );
    }

    #[test]
    fn test_link_without_token() {
        // ---
        assert_eq!(photo_token("https://example.com/share"), None);
        assert_eq!(photo_token(""), None);
        assert_eq!(photo_token("https://example.com/share?id="), None);
    }

    #[test]
    fn test_download_url_shape() {
        // ---
        assert_eq!(
            download_url("abc123"),
            "https://drive.google.com/uc?export=download&id=abc123"
        );
    }

    #[tokio::test]
    async fn test_stored_identifiers_resolve_without_fetching() {
        // ---
        let pool = store::connect("sqlite::memory:", 1).await.unwrap();
        crate::schema::create_schema(&pool).await.unwrap();
        store::insert_photo_if_absent(&pool, "known", b"bytes")
            .await
            .unwrap();

        // Both rows reference the stored photo; nothing hits the network.
        let links = vec![
            "https://drive.google.com/open?id=known".to_string(),
            "https://drive.google.com/open?id=known".to_string(),
            String::new(),
        ];
        let client = Client::new();
        let ids = resolve_photos(&pool, &client, &links, 2).await.unwrap();

        assert_eq!(ids[0].as_deref(), Some("known"));
        assert_eq!(ids[1].as_deref(), Some("known"));
        assert_eq!(ids[2], None);

        // Still exactly one stored photo
        assert_eq!(store::existing_photo_ids(&pool).await.unwrap().len(), 1);
    }
}
