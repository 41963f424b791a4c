use std::fmt::Write;

use crate::decoder::is_analyzable;
use crate::export::format_timestamp;
use crate::models::{ApiResults, LogEntry, ResultField, NO_VALID_URL};

const INDENT: &str = "  ";

/// Whether the panel should request analysis for this entry.
pub fn needs_analysis(entry: &LogEntry) -> bool {
    entry.api_results.is_pending() && is_analyzable(&entry.original_url)
}

/// Full block for one entry.
pub fn render_entry(entry: &LogEntry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {}", format_timestamp(&entry.timestamp), entry.id);
    let _ = writeln!(out, "{INDENT}Page URL:           {}", entry.page_url);
    let _ = writeln!(out, "{INDENT}Original Image URL: {}", entry.original_url);
    let _ = writeln!(out, "{INDENT}Encoded Image URL:  {}", entry.encoded);
    let _ = writeln!(out, "{INDENT}API Results:");
    out.push_str(&render_results_block(entry));
    let _ = write!(
        out,
        "{INDENT}{} QA Approved",
        if entry.qa_approved { "[x]" } else { "[ ]" }
    );
    out
}

/// The results section, or the no-URL notice for pending entries that
/// cannot be analyzed.
pub fn render_results_block(entry: &LogEntry) -> String {
    if entry.api_results.is_pending() && !is_analyzable(&entry.original_url) {
        return format!("{INDENT}{INDENT}{NO_VALID_URL}\n");
    }
    render_results(&entry.api_results)
}

pub fn render_results(results: &ApiResults) -> String {
    let mut out = String::new();
    render_group(&mut out, "Quality Analysis", &ResultField::QUALITY, results);
    render_group(&mut out, "Image Metrics", &ResultField::METRICS, results);
    out
}

fn render_group(out: &mut String, title: &str, fields: &[ResultField], results: &ApiResults) {
    let _ = writeln!(out, "{INDENT}{INDENT}{title}:");
    for &field in fields {
        let _ = writeln!(
            out,
            "{INDENT}{INDENT}{INDENT}{}: {}",
            field.label(),
            results.get(field)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResultValue, NO_EXTRACT};

    fn entry(original_url: &str) -> LogEntry {
        LogEntry {
            id: "e1".into(),
            timestamp: "2024-03-01T12:00:00.000Z".into(),
            page_url: "https://news.example/".into(),
            original_url: original_url.into(),
            encoded: "https://cdn.example/x".into(),
            api_results: ApiResults::default(),
            qa_approved: false,
        }
    }

    #[test]
    fn groups_list_every_field() {
        let mut results = ApiResults::default();
        results.width = ResultValue::Numeric(1200.0);
        results.thumbnail = ResultValue::error("503");
        let text = render_results(&results);

        assert!(text.contains("Quality Analysis:"));
        assert!(text.contains("Image Metrics:"));
        assert!(text.contains("Thumbnail: Error: 503"));
        assert!(text.contains("Width: 1200"));
        assert!(text.contains("Total Pixels: N/A"));
        assert!(text.find("Story").unwrap() < text.find("Width").unwrap());
    }

    #[test]
    fn sentinel_url_shows_no_valid_url() {
        let e = entry(NO_EXTRACT);
        assert!(!needs_analysis(&e));
        assert!(render_entry(&e).contains(NO_VALID_URL));
    }

    #[test]
    fn pending_real_url_needs_analysis() {
        let e = entry("https://img.example/a.jpg");
        assert!(needs_analysis(&e));
        assert!(render_entry(&e).contains("Thumbnail: N/A"));
    }

    #[test]
    fn qa_checkbox_state() {
        let mut e = entry("https://img.example/a.jpg");
        assert!(render_entry(&e).ends_with("[ ] QA Approved"));
        e.qa_approved = true;
        assert!(render_entry(&e).ends_with("[x] QA Approved"));
    }
}
