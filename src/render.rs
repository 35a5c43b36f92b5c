//! Per-city leak map rendering.
//!
//! Loads one city's measurements plus the photo store and emits a single
//! interactive Leaflet HTML document: red/green circle markers split across
//! toggleable "Leak"/"No leak" layers, popups with the reading, timestamp,
//! infrastructure type, and an inlined thumbnail of the photo. Rows without
//! coordinates are skipped entirely. The viewport centers on the mean of the
//! plotted points and fits their bounding box.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::store;
use crate::Observation;

// ---

/// Thumbnail bounding box, pixels. Keeps the HTML document size bounded no
/// matter what resolution the volunteers upload.
const THUMBNAIL_SIZE: u32 = 100;

/// Render the leak map for `city` into `<out_dir>/<city>_map.html` and return
/// the written path.
pub async fn render_city_map(pool: &SqlitePool, city: &str, out_dir: &str) -> Result<PathBuf> {
    // ---
    // Step 1: data load
    let observations = store::observations_for_city(pool, city)
        .await
        .with_context(|| format!("Failed to load measurements for '{city}'"))?;
    let photos = store::load_photos(pool)
        .await
        .context("Failed to load photo store")?;

    // Step 2: geometry build
    let points: Vec<(f64, f64, &Observation)> = observations
        .iter()
        .filter_map(|obs| match (obs.latitude, obs.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon, obs)),
            _ => None,
        })
        .collect();

    if points.is_empty() {
        return Err(anyhow!(
            "No measurements with valid coordinates for '{city}'"
        ));
    }
    info!(
        "Plotting {} of {} measurements for {}",
        points.len(),
        observations.len(),
        city
    );

    // Step 3: render
    let html = render_html(city, &points, &photos).context("Failed to render map document")?;

    // Step 4: save
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory '{out_dir}'"))?;
    let path = PathBuf::from(out_dir).join(format!("{city}_map.html"));
    std::fs::write(&path, html).with_context(|| format!("Failed to save map to {path:?}"))?;

    info!("Map has been saved as {}", path.display());
    Ok(path)
}

/// Build the full standalone HTML document.
fn render_html(
    city: &str,
    points: &[(f64, f64, &Observation)],
    photos: &HashMap<String, Vec<u8>>,
) -> Result<String> {
    // ---
    let count = points.len() as f64;
    let center_lat = points.iter().map(|(lat, _, _)| lat).sum::<f64>() / count;
    let center_lon = points.iter().map(|(_, lon, _)| lon).sum::<f64>() / count;

    let mut min_lat = f64::INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut min_lon = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;
    for (lat, lon, _) in points {
        min_lat = min_lat.min(*lat);
        max_lat = max_lat.max(*lat);
        min_lon = min_lon.min(*lon);
        max_lon = max_lon.max(*lon);
    }

    let mut markers = String::new();
    for (lat, lon, obs) in points {
        let popup = popup_html(obs, photos);
        // JSON-encode the popup so it embeds as a valid JS string literal
        let popup_js = serde_json::to_string(&popup)?;
        let (layer, color) = if obs.leak {
            ("leakLayer", "#d73027")
        } else {
            ("noLeakLayer", "#1a9850")
        };
        markers.push_str(&format!(
            "L.circleMarker([{lat}, {lon}], {{radius: 8, color: '{color}', fillColor: '{color}', fillOpacity: 0.8}}).bindPopup({popup_js}, {{maxWidth: 240}}).addTo({layer});\n"
        ));
    }

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<title>{title} methane leaks</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css"/>
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map('map', {{ center: [{center_lat}, {center_lon}], zoom: 13 }});
L.tileLayer('https://tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
    maxZoom: 19,
    attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
var leakLayer = L.layerGroup().addTo(map);
var noLeakLayer = L.layerGroup().addTo(map);
{markers}
L.control.layers(null, {{ 'Leak': leakLayer, 'No leak': noLeakLayer }}).addTo(map);
map.fitBounds([[{min_lat}, {min_lon}], [{max_lat}, {max_lon}]]);
</script>
</body>
</html>
"#,
        title = escape_html(city),
    ))
}

/// Popup body for one marker: reading, timestamp, infrastructure type, and
/// the photo thumbnail (or a placeholder when there is none).
fn popup_html(obs: &Observation, photos: &HashMap<String, Vec<u8>>) -> String {
    // ---
    let image_html = obs
        .photo_id
        .as_ref()
        .and_then(|id| {
            let blob = photos.get(id);
            if blob.is_none() {
                warn!("No matching image found for photo_id == {}", id);
            }
            blob.map(|b| (id, b))
        })
        .and_then(|(id, blob)| match thumbnail_base64(blob) {
            Ok(encoded) => Some(format!(
                r#"<img src="data:image/jpeg;base64,{encoded}" width="{THUMBNAIL_SIZE}" height="{THUMBNAIL_SIZE}"/>"#
            )),
            Err(e) => {
                warn!("Could not thumbnail photo {}: {}", id, e);
                None
            }
        })
        .unwrap_or_else(|| String::from("<p>No image available</p>"));

    format!(
        "<h6>Methane reading: ~{level} ppm</h6>\
         <h6>Date/time recorded: {timestamp}</h6>\
         <h6>Infrastructure type: {infrastructure}</h6>\
         <h6>Picture:</h6>{image_html}",
        level = obs.methane_level,
        timestamp = escape_html(obs.timestamp.as_deref().unwrap_or("unknown")),
        infrastructure = escape_html(obs.type_of_infrastructure.as_deref().unwrap_or("unknown")),
    )
}

/// Decode a stored photo, shrink it into the thumbnail bounding box, and
/// re-encode as base64 JPEG.
fn thumbnail_base64(blob: &[u8]) -> Result<String> {
    // ---
    let img = image::load_from_memory(blob).context("unreadable image data")?;
    // JPEG has no alpha channel; flatten before encoding
    let thumb = image::DynamicImage::ImageRgb8(
        img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8(),
    );

    let mut buffer = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
        .context("JPEG encoding failed")?;

    Ok(STANDARD.encode(&buffer))
}

fn escape_html(text: &str) -> String {
    // ---
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn observation(leak: bool, photo_id: Option<&str>) -> Observation {
        // ---
        Observation {
            city: "Portland".into(),
            methane_level: if leak { 1000.0 } else { 0.0 },
            leak,
            type_of_infrastructure: Some("gas main".into()),
            photo_id: photo_id.map(String::from),
            latitude: Some(43.66),
            longitude: Some(-70.25),
            volunteer: "MM".into(),
            timestamp: Some("2024-07-06 14:30:00".into()),
        }
    }

    fn tiny_png() -> Vec<u8> {
        // ---
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([120, 30, 200]));
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_popup_inlines_thumbnail() {
        // ---
        let mut photos = HashMap::new();
        photos.insert("p1".to_string(), tiny_png());

        let html = popup_html(&observation(true, Some("p1")), &photos);
        assert!(html.contains("data:image/jpeg;base64,"));
        assert!(html.contains("~1000 ppm"));
    }

    #[test]
    fn test_popup_placeholder_when_photo_missing() {
        // ---
        let photos = HashMap::new();

        // photo_id present but no stored photo
        let html = popup_html(&observation(true, Some("ghost")), &photos);
        assert!(html.contains("No image available"));

        // no photo_id at all
        let html = popup_html(&observation(true, None), &photos);
        assert!(html.contains("No image available"));
    }

    #[test]
    fn test_thumbnail_fits_bounding_box() {
        // ---
        let img = image::RgbImage::from_pixel(400, 200, image::Rgb([10, 10, 10]));
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();

        let encoded = thumbnail_base64(&buffer).unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        let thumb = image::load_from_memory(&decoded).unwrap();
        assert!(thumb.width() <= THUMBNAIL_SIZE);
        assert!(thumb.height() <= THUMBNAIL_SIZE);
    }

    #[test]
    fn test_thumbnail_rejects_garbage() {
        // ---
        assert!(thumbnail_base64(b"not an image").is_err());
    }

    #[test]
    fn test_markers_split_by_leak_layer() {
        // ---
        let photos = HashMap::new();
        let leak = observation(true, None);
        let fine = observation(false, None);
        let points = vec![
            (43.66, -70.25, &leak),
            (43.67, -70.26, &fine),
        ];

        let html = render_html("Portland", &points, &photos).unwrap();
        assert_eq!(html.matches("L.circleMarker").count(), 2);
        assert!(html.contains(".addTo(leakLayer)"));
        assert!(html.contains(".addTo(noLeakLayer)"));
        assert!(html.contains("map.fitBounds([[43.66, -70.26], [43.67, -70.25]]"));
    }

    #[test]
    fn test_html_escaping() {
        // ---
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
