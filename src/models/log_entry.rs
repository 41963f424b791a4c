//! Audit log entry plus the raw record the in-page detector buffers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::api_results::{deserialize_lenient, ApiResults};

/// One record as pushed into the page-global buffer by the swipe detector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferRecord {
    pub page_url: String,
    pub original_url: String,
    pub encoded: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Persisted audit entry. Field names match the panel's stored JSON.
///
/// Every field reads leniently: a wrongly typed value degrades that field
/// instead of the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub page_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub encoded: String,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub api_results: ApiResults,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub qa_approved: bool,
}

impl LogEntry {
    /// Build a fresh entry from a drained buffer record. The record's own
    /// timestamp wins when present.
    pub fn from_record(record: BufferRecord, now: DateTime<Utc>) -> Self {
        let timestamp = record
            .timestamp
            .filter(|ts| !ts.is_empty())
            .unwrap_or_else(|| iso_timestamp(now));

        Self {
            id: new_entry_id(),
            timestamp,
            page_url: record.page_url,
            original_url: record.original_url,
            encoded: record.encoded,
            api_results: ApiResults::default(),
            qa_approved: false,
        }
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Fields a caller may change after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub qa_approved: Option<bool>,
    pub api_results: Option<ApiResults>,
}

impl EntryPatch {
    pub fn qa(approved: bool) -> Self {
        Self {
            qa_approved: Some(approved),
            ..Self::default()
        }
    }

    pub fn results(results: ApiResults) -> Self {
        Self {
            api_results: Some(results),
            ..Self::default()
        }
    }

    pub fn apply(self, entry: &mut LogEntry) {
        if let Some(approved) = self.qa_approved {
            entry.qa_approved = approved;
        }
        if let Some(results) = self.api_results {
            entry.api_results = results;
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) => value,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(value) => value,
        Value::String(value) => value.eq_ignore_ascii_case("true"),
        Value::Number(value) => value.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

pub fn new_entry_id() -> String {
    Uuid::new_v4().to_string()
}

/// `Date.prototype.toISOString` layout: millisecond precision, `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultValue;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn from_record_stamps_missing_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let entry = LogEntry::from_record(
            BufferRecord {
                page_url: "https://news.example/a".into(),
                original_url: "https://img.example/p.jpg".into(),
                encoded: "https://cdn.example/x/https%3A".into(),
                timestamp: None,
            },
            now,
        );
        assert_eq!(entry.timestamp, "2024-03-01T12:00:00.000Z");
        assert!(!entry.id.is_empty());
        assert!(entry.api_results.is_pending());
        assert!(!entry.qa_approved);
    }

    #[test]
    fn from_record_keeps_existing_timestamp() {
        let now = Utc::now();
        let entry = LogEntry::from_record(
            BufferRecord {
                timestamp: Some("2023-01-01T00:00:00.000Z".into()),
                ..BufferRecord::default()
            },
            now,
        );
        assert_eq!(entry.timestamp, "2023-01-01T00:00:00.000Z");
    }

    #[test]
    fn legacy_html_results_deserialize_as_pending() {
        let raw = json!({
            "id": "1700000000000-abc123def",
            "timestamp": "2023-11-14T22:13:20.000Z",
            "pageUrl": "https://news.example/",
            "originalUrl": "https://img.example/p.jpg",
            "encoded": "",
            "apiResults": "<div><strong>Thumbnail:</strong> 0.4</div>",
        });
        let entry: LogEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.api_results, ApiResults::default());
        assert!(!entry.qa_approved);
    }

    #[test]
    fn patch_merges_only_given_fields() {
        let mut entry = LogEntry::from_record(BufferRecord::default(), Utc::now());
        EntryPatch::qa(true).apply(&mut entry);
        assert!(entry.qa_approved);

        let mut results = ApiResults::default();
        results.story = ResultValue::Numeric(0.9);
        EntryPatch::results(results.clone()).apply(&mut entry);
        assert!(entry.qa_approved);
        assert_eq!(entry.api_results, results);
    }
}
