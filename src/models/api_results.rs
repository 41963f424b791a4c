//! Fixed-shape analysis results attached to every log entry.
//!
//! Persisted as a JSON object keyed by display name with string values, the
//! same layout the panel always wrote, e.g.
//! `{"Thumbnail": "0.91", "Full Screen": "N/A", "Width": "Error: 500", ...}`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const NOT_AVAILABLE: &str = "N/A";
const ERROR_PREFIX: &str = "Error: ";

/// One result cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResultValue {
    Numeric(f64),
    Text(String),
    Error(String),
    #[default]
    NotAvailable,
}

impl ResultValue {
    pub fn error(message: impl Into<String>) -> Self {
        ResultValue::Error(message.into())
    }

    /// Classify a persisted or API-provided string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == NOT_AVAILABLE {
            return ResultValue::NotAvailable;
        }
        if let Some(message) = raw.strip_prefix(ERROR_PREFIX) {
            return ResultValue::Error(message.to_string());
        }
        if raw == "Error:" {
            return ResultValue::Error(String::new());
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => ResultValue::Numeric(number),
            _ => ResultValue::Text(raw.to_string()),
        }
    }

    /// Map an arbitrary JSON value into a cell. `null` counts as missing.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ResultValue::NotAvailable,
            Value::Number(number) => number
                .as_f64()
                .map(ResultValue::Numeric)
                .unwrap_or_else(|| ResultValue::Text(number.to_string())),
            Value::String(text) => ResultValue::parse(text),
            Value::Bool(flag) => ResultValue::Text(flag.to_string()),
            other => ResultValue::Text(other.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, ResultValue::NotAvailable)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResultValue::Error(_))
    }

    /// Numeric reading of the cell, used by the export summary.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResultValue::Numeric(number) => Some(*number),
            ResultValue::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Numeric(number) => write!(f, "{number}"),
            ResultValue::Text(text) => f.write_str(text),
            ResultValue::Error(message) => write!(f, "{ERROR_PREFIX}{message}"),
            ResultValue::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for ResultValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResultValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(ResultValue::from_json(&value))
    }
}

/// The seven result columns, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultField {
    Thumbnail,
    FullScreen,
    Story,
    Width,
    Height,
    LaplacianVariance,
    TotalPixels,
}

impl ResultField {
    pub const ALL: [ResultField; 7] = [
        ResultField::Thumbnail,
        ResultField::FullScreen,
        ResultField::Story,
        ResultField::Width,
        ResultField::Height,
        ResultField::LaplacianVariance,
        ResultField::TotalPixels,
    ];

    /// Fields owned by the quality endpoint.
    pub const QUALITY: [ResultField; 3] = [
        ResultField::Thumbnail,
        ResultField::FullScreen,
        ResultField::Story,
    ];

    /// Fields owned by the metrics endpoint.
    pub const METRICS: [ResultField; 4] = [
        ResultField::Width,
        ResultField::Height,
        ResultField::LaplacianVariance,
        ResultField::TotalPixels,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResultField::Thumbnail => "Thumbnail",
            ResultField::FullScreen => "Full Screen",
            ResultField::Story => "Story",
            ResultField::Width => "Width",
            ResultField::Height => "Height",
            ResultField::LaplacianVariance => "Laplacian Variance",
            ResultField::TotalPixels => "Total Pixels",
        }
    }

    /// Key used by the analysis services in their response bodies.
    pub fn wire_key(self) -> &'static str {
        match self {
            ResultField::Thumbnail => "thumbnail",
            ResultField::FullScreen => "full_screen",
            ResultField::Story => "story",
            ResultField::Width => "width",
            ResultField::Height => "height",
            ResultField::LaplacianVariance => "laplacianVariance",
            ResultField::TotalPixels => "totalPixels",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiResults {
    #[serde(rename = "Thumbnail")]
    pub thumbnail: ResultValue,
    #[serde(rename = "Full Screen")]
    pub full_screen: ResultValue,
    #[serde(rename = "Story")]
    pub story: ResultValue,
    #[serde(rename = "Width")]
    pub width: ResultValue,
    #[serde(rename = "Height")]
    pub height: ResultValue,
    #[serde(rename = "Laplacian Variance")]
    pub laplacian_variance: ResultValue,
    #[serde(rename = "Total Pixels")]
    pub total_pixels: ResultValue,
}

impl ApiResults {
    pub fn get(&self, field: ResultField) -> &ResultValue {
        match field {
            ResultField::Thumbnail => &self.thumbnail,
            ResultField::FullScreen => &self.full_screen,
            ResultField::Story => &self.story,
            ResultField::Width => &self.width,
            ResultField::Height => &self.height,
            ResultField::LaplacianVariance => &self.laplacian_variance,
            ResultField::TotalPixels => &self.total_pixels,
        }
    }

    pub fn set(&mut self, field: ResultField, value: ResultValue) {
        let slot = match field {
            ResultField::Thumbnail => &mut self.thumbnail,
            ResultField::FullScreen => &mut self.full_screen,
            ResultField::Story => &mut self.story,
            ResultField::Width => &mut self.width,
            ResultField::Height => &mut self.height,
            ResultField::LaplacianVariance => &mut self.laplacian_variance,
            ResultField::TotalPixels => &mut self.total_pixels,
        };
        *slot = value;
    }

    pub fn fill(&mut self, fields: &[ResultField], value: &ResultValue) {
        for field in fields {
            self.set(*field, value.clone());
        }
    }

    /// Still waiting on analysis: either endpoint's leading field is unset.
    pub fn is_pending(&self) -> bool {
        !self.thumbnail.is_available() || !self.width.is_available()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResultField, &ResultValue)> + '_ {
        ResultField::ALL.into_iter().map(move |field| (field, self.get(field)))
    }
}

/// Accepts the object layout and degrades anything else (the old HTML-string
/// layout, `null`, garbage) to all-`N/A` so those entries get re-analyzed.
pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<ApiResults, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Object(_) => Ok(serde_json::from_value(value).unwrap_or_default()),
        _ => Ok(ApiResults::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_classifies_placeholders_and_numbers() {
        assert_eq!(ResultValue::parse("N/A"), ResultValue::NotAvailable);
        assert_eq!(ResultValue::parse("Error: 503"), ResultValue::error("503"));
        assert_eq!(ResultValue::parse("0.25"), ResultValue::Numeric(0.25));
        assert_eq!(
            ResultValue::parse("blurry"),
            ResultValue::Text("blurry".into())
        );
    }

    #[test]
    fn display_matches_persisted_strings() {
        assert_eq!(ResultValue::Numeric(1920.0).to_string(), "1920");
        assert_eq!(ResultValue::Numeric(0.5).to_string(), "0.5");
        assert_eq!(
            ResultValue::error("Failed to parse response").to_string(),
            "Error: Failed to parse response"
        );
        assert_eq!(ResultValue::NotAvailable.to_string(), "N/A");
    }

    #[test]
    fn default_results_serialize_all_seven_keys() {
        let value = serde_json::to_value(ApiResults::default()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 7);
        for field in ResultField::ALL {
            assert_eq!(object[field.label()], json!("N/A"));
        }
    }

    #[test]
    fn missing_keys_and_raw_numbers_deserialize() {
        let results: ApiResults =
            serde_json::from_value(json!({"Story": 0.7, "Width": "640"})).unwrap();
        assert_eq!(results.story, ResultValue::Numeric(0.7));
        assert_eq!(results.width, ResultValue::Numeric(640.0));
        assert_eq!(results.height, ResultValue::NotAvailable);
    }

    #[test]
    fn pending_tracks_leading_fields() {
        let mut results = ApiResults::default();
        assert!(results.is_pending());
        results.fill(&ResultField::ALL, &ResultValue::error("timeout"));
        assert!(!results.is_pending());
        results.set(ResultField::Width, ResultValue::NotAvailable);
        assert!(results.is_pending());
    }

    #[test]
    fn as_number_reads_numeric_text() {
        assert_eq!(ResultValue::Text(" 3.5 ".into()).as_number(), Some(3.5));
        assert_eq!(ResultValue::error("x").as_number(), None);
        assert_eq!(ResultValue::NotAvailable.as_number(), None);
    }
}
