//! Data models for the methane leak pipeline.

use serde::Serialize;

// ---

/// Raw tabular batch from the spreadsheet source: one header row plus data
/// rows, all cells as text. Rows are padded/truncated to the header width
/// when the batch is built, so positional access is always in range.
#[derive(Debug, Clone)]
pub struct RawBatch {
    // ---
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawBatch {
    // ---
    pub fn column(&self, name: &str) -> Option<usize> {
        // ---
        self.headers.iter().position(|h| h == name)
    }

    /// Cell value for a named column in the given row, or `""` when the
    /// column or row does not exist.
    pub fn field<'a>(&'a self, row: usize, name: &str) -> &'a str {
        // ---
        self.column(name)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Fully transformed survey row, ready for persistence and mapping.
///
/// `latitude`/`longitude` are both present or both absent; `leak` is derived
/// from the converted ppm level and never set independently.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Observation {
    // ---
    pub city: String,
    /// Methane concentration in parts per million (converted from LEL %).
    pub methane_level: f64,
    pub leak: bool,
    pub type_of_infrastructure: Option<String>,
    pub photo_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub volunteer: String,
    /// Canonical `YYYY-MM-DD HH:MM:SS` text, or `None` when the source value
    /// was unparseable. Functions as the natural idempotency key.
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn sample_batch() -> RawBatch {
        // ---
        RawBatch {
            headers: vec!["timestamp".into(), "methane_level".into(), "city".into()],
            rows: vec![
                vec!["07/06/2024 14:30:00".into(), "2.0".into(), "Portland".into()],
                vec!["".into(), "0".into(), "Bangor".into()],
            ],
        }
    }

    #[test]
    fn test_field_lookup() {
        // ---
        let batch = sample_batch();
        assert_eq!(batch.field(0, "city"), "Portland");
        assert_eq!(batch.field(1, "methane_level"), "0");
    }

    #[test]
    fn test_missing_column_is_empty() {
        // ---
        let batch = sample_batch();
        assert_eq!(batch.field(0, "no_such_column"), "");
        assert!(batch.column("no_such_column").is_none());
    }

    #[test]
    fn test_out_of_range_row_is_empty() {
        // ---
        let batch = sample_batch();
        assert_eq!(batch.field(99, "city"), "");
        assert_eq!(batch.len(), 2);
    }
}
