//! Series rows returned by the backend and their normalization
//!
//! Rows arrive as loosely typed JSON. Numbers may be encoded as strings and
//! anything that does not yield a finite timestamp and value is dropped.

use serde::Serialize;
use serde_json::Value;

/// Time interval a point aggregates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketSpan {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// Epoch milliseconds
    pub ts: f64,
    pub y: f64,
    pub bucket: Option<BucketSpan>,
    pub sample_content: Option<String>,
    pub sample_url: Option<String>,
    pub meta: Option<Value>,
}

impl SeriesPoint {
    pub fn new(ts: f64, y: f64) -> Self {
        Self {
            ts,
            y,
            bucket: None,
            sample_content: None,
            sample_url: None,
            meta: None,
        }
    }

    /// String or number field of `meta`
    pub fn meta_text(&self, key: &str) -> Option<String> {
        match self.meta.as_ref()?.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Lenient numeric conversion: numbers and numeric strings
fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// First present, non-null field among `keys`
fn first_of<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| row.get(key))
        .find(|value| !value.is_null())
}

/// Normalizes one row; `None` when it has no usable timestamp or value
pub fn normalize_point(row: &Value) -> Option<SeriesPoint> {
    if !row.is_object() {
        return None;
    }
    let ts = numeric(row.get("ts")?)?;
    let y = match row.get("y") {
        None | Some(Value::Null) => 0.0,
        Some(value) => numeric(value)?,
    };

    let bucket = match (
        row.get("bucket_start").and_then(numeric),
        row.get("bucket_end").and_then(numeric),
    ) {
        (Some(start), Some(end)) => Some(BucketSpan { start, end }),
        _ => None,
    };

    Some(SeriesPoint {
        ts,
        y,
        bucket,
        sample_content: text(first_of(row, &["sample_content", "sample"])),
        sample_url: first_of(row, &["sample_url", "url"])
            .and_then(Value::as_str)
            .map(str::to_string),
        meta: row.get("meta").filter(|meta| meta.is_object()).cloned(),
    })
}

/// Normalizes a whole response; anything but an array yields no points
pub fn normalize_rows(rows: &Value) -> Vec<SeriesPoint> {
    let Some(rows) = rows.as_array() else {
        return Vec::new();
    };
    let points: Vec<SeriesPoint> = rows.iter().filter_map(normalize_point).collect();
    if points.len() < rows.len() {
        log::debug!("Dropped {} malformed series rows", rows.len() - points.len());
    }
    points
}

/// Sum of all values, `0.0` for an empty series
pub fn total(points: &[SeriesPoint]) -> f64 {
    points.iter().fold(0.0, |sum, p| sum + p.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings_accepted() {
        let point = normalize_point(&json!({"ts": "1700000000000", "y": " 3 "})).unwrap();
        assert_eq!(point.ts, 1_700_000_000_000.0);
        assert_eq!(point.y, 3.0);
    }

    #[test]
    fn test_missing_value_counts_as_zero() {
        assert_eq!(normalize_point(&json!({"ts": 5})).unwrap().y, 0.0);
        assert_eq!(normalize_point(&json!({"ts": 5, "y": null})).unwrap().y, 0.0);
    }

    #[test]
    fn test_malformed_rows_dropped() {
        let rows = json!([
            {"ts": 1, "y": 1},
            {"ts": "soon", "y": 1},
            {"ts": 2, "y": "many"},
            {"y": 4},
            {"ts": "inf", "y": 1},
            {"ts": "NaN", "y": 1},
            "not a row",
            {"ts": 3, "y": 2.5}
        ]);
        let points = normalize_rows(&rows);
        assert_eq!(points.iter().map(|p| p.ts).collect::<Vec<_>>(), vec![1.0, 3.0]);
        assert_eq!(total(&points), 3.5);
        assert!(total(&[]).is_sign_positive());
    }

    #[test]
    fn test_non_array_response() {
        assert!(normalize_rows(&json!({"error": "nope"})).is_empty());
        assert!(normalize_rows(&Value::Null).is_empty());
    }

    #[test]
    fn test_bucket_needs_both_bounds() {
        let full = normalize_point(&json!({"ts": 10, "bucket_start": 0, "bucket_end": "20"})).unwrap();
        assert_eq!(full.bucket, Some(BucketSpan { start: 0.0, end: 20.0 }));

        let half = normalize_point(&json!({"ts": 10, "bucket_start": 0})).unwrap();
        assert_eq!(half.bucket, None);
    }

    #[test]
    fn test_sample_fallbacks() {
        let point = normalize_point(&json!({
            "ts": 1,
            "y": 1,
            "sample": "hello",
            "url": "https://discord.com/channels/1/2/3",
            "meta": {"guild_name": "Guild", "channel_id": 42}
        }))
        .unwrap();
        assert_eq!(point.sample_content.as_deref(), Some("hello"));
        assert_eq!(point.sample_url.as_deref(), Some("https://discord.com/channels/1/2/3"));
        assert_eq!(point.meta_text("guild_name").as_deref(), Some("Guild"));
        assert_eq!(point.meta_text("channel_id").as_deref(), Some("42"));
        assert_eq!(point.meta_text("missing"), None);

        let preferred = normalize_point(&json!({
            "ts": 1,
            "sample_content": "primary",
            "sample": "fallback",
            "meta": "not an object"
        }))
        .unwrap();
        assert_eq!(preferred.sample_content.as_deref(), Some("primary"));
        assert_eq!(preferred.meta, None);
    }
}
