//! Free-text coordinate parsing.
//!
//! Volunteers paste coordinates into the survey form in a handful of shapes:
//! `44.5, -70.2`, `(44.5, -70.2)`, `44.5°N, 70.2°W`, with or without
//! whitespace. One grammar validates and captures in a single pass; anything
//! that does not match yields no coordinates for that row rather than an
//! error, so the row itself survives.

use std::sync::OnceLock;

use regex::Regex;

// ---

/// Accepted grammar: optional surrounding whitespace and parentheses, a
/// signed decimal with optional degree mark and N/S letter, a comma
/// separator, a signed decimal with optional degree mark and E/W letter.
fn coordinate_pattern() -> &'static Regex {
    // ---
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*\(?\s*([+-]?\d+(?:\.\d+)?)\s*°?\s*([NSns])?\s*,\s*([+-]?\d+(?:\.\d+)?)\s*°?\s*([EWew])?\s*\)?\s*$",
        )
        .unwrap()
    })
}

/// Parse a free-text coordinate string into a signed `(latitude, longitude)`
/// pair. Returns `None` for anything outside the grammar.
///
/// A hemisphere letter overrides the numeric sign in the forcing direction:
/// `S` makes the latitude negative and `W` makes the longitude negative.
/// `N`/`E` and absent letters leave the parsed sign untouched.
pub fn parse_coordinates(text: &str) -> Option<(f64, f64)> {
    // ---
    let caps = coordinate_pattern().captures(text)?;

    let mut latitude: f64 = caps[1].parse().ok()?;
    let mut longitude: f64 = caps[3].parse().ok()?;

    if let Some(letter) = caps.get(2) {
        if letter.as_str().eq_ignore_ascii_case("s") {
            latitude = -latitude.abs();
        }
    }
    if let Some(letter) = caps.get(4) {
        if letter.as_str().eq_ignore_ascii_case("w") {
            longitude = -longitude.abs();
        }
    }

    Some((latitude, longitude))
}
