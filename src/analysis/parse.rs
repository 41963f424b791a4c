use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{ApiResults, ResultField, ResultValue};

pub(crate) const PARSE_FAILURE: &str = "Failed to parse response";

/// Decode a successful response body into a key/value map.
///
/// JSON objects are taken as-is. Bodies that look like markup are read as
/// the older XML form, one element per key. Anything else is a parse
/// failure.
pub(crate) fn parse_body(body: &str) -> Option<Map<String, Value>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        return parse_legacy_xml(trimmed);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn parse_legacy_xml(body: &str) -> Option<Map<String, Value>> {
    let mut map = Map::new();
    for field in ResultField::ALL {
        let key = field.wire_key();
        if let Some(text) = xml_text(body, key) {
            map.insert(key.to_string(), Value::String(text));
        }
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn xml_text(body: &str, tag: &str) -> Option<String> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let pattern = TAG.get_or_init(|| {
        Regex::new(r"<([A-Za-z_][\w]*)\s*>\s*([^<]*?)\s*</([A-Za-z_][\w]*)\s*>")
            .expect("xml element regex compiles")
    });

    pattern.captures_iter(body).find_map(|caps| {
        let open = caps.get(1)?.as_str();
        let close = caps.get(3)?.as_str();
        (open == tag && close == tag).then(|| caps[2].to_string())
    })
}

/// Write one endpoint's parsed body into its fields. Keys the body does
/// not carry become `N/A`.
pub(crate) fn apply_fields(results: &mut ApiResults, fields: &[ResultField], body: &Map<String, Value>) {
    for &field in fields {
        let value = body
            .get(field.wire_key())
            .map(ResultValue::from_json)
            .unwrap_or_default();
        results.set(field, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_maps_known_keys() {
        let body = parse_body(r#"{"thumbnail": 0.91, "story": "0.5", "extra": 1}"#).unwrap();
        let mut results = ApiResults::default();
        apply_fields(&mut results, &ResultField::QUALITY, &body);

        assert_eq!(results.thumbnail, ResultValue::Numeric(0.91));
        assert_eq!(results.story, ResultValue::Numeric(0.5));
        assert_eq!(results.full_screen, ResultValue::NotAvailable);
    }

    #[test]
    fn non_object_json_is_a_parse_failure() {
        assert!(parse_body("[1, 2]").is_none());
        assert!(parse_body("null").is_none());
        assert!(parse_body("not json").is_none());
        assert!(parse_body("").is_none());
    }

    #[test]
    fn legacy_xml_is_accepted() {
        let body = parse_body(
            "<metrics>\n  <width>1200</width>\n  <height> 800 </height>\n  <laplacianVariance>153.2</laplacianVariance>\n</metrics>",
        )
        .unwrap();
        let mut results = ApiResults::default();
        apply_fields(&mut results, &ResultField::METRICS, &body);

        assert_eq!(results.width, ResultValue::Numeric(1200.0));
        assert_eq!(results.height, ResultValue::Numeric(800.0));
        assert_eq!(results.laplacian_variance, ResultValue::Numeric(153.2));
        assert_eq!(results.total_pixels, ResultValue::NotAvailable);
    }

    #[test]
    fn markup_without_known_tags_is_a_parse_failure() {
        assert!(parse_body("<html><body>Bad gateway</body></html>").is_none());
    }

    #[test]
    fn null_values_are_not_available() {
        let body = parse_body(r#"{"width": null, "height": 10}"#).unwrap();
        let mut results = ApiResults::default();
        apply_fields(&mut results, &ResultField::METRICS, &body);
        assert_eq!(results.width, ResultValue::NotAvailable);
        assert_eq!(results.height, ResultValue::Numeric(10.0));
    }
}
