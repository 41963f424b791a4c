//! CSV export of the audit log.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use log::info;
use thiserror::Error;

use crate::models::{LogEntry, ResultField, NO_LOGS, NOT_AVAILABLE};

pub const CSV_MIME: &str = "text/csv;charset=utf-8";

const STORY_AVERAGE_LABEL: &str = "Story Average (QA Approved)";
const AVERAGE_PRECISION: usize = 6;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HEADERS: [&str; 12] = [
    "Timestamp",
    "Page URL",
    "Original Image URL",
    "Encoded Image URL",
    "QA Approved",
    "Thumbnail",
    "Full Screen",
    "Story",
    "Width",
    "Height",
    "Laplacian Variance",
    "Total Pixels",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{}", NO_LOGS)]
    NoLogs,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Quote a field when it contains a comma, a quote or a newline.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Local wall-clock rendering of a stored ISO timestamp. Unparseable values
/// pass through unchanged.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
        Err(_) => raw.to_string(),
    }
}

pub fn csv_file_name(date: NaiveDate) -> String {
    format!("img-audit-logs-{}.csv", date.format("%Y-%m-%d"))
}

/// Header, one row per entry, then the summary row. Lines are joined with
/// `\n` and there is no trailing newline.
pub fn render_csv(entries: &[LogEntry]) -> Result<String, ExportError> {
    if entries.is_empty() {
        return Err(ExportError::NoLogs);
    }

    let mut lines = Vec::with_capacity(entries.len() + 2);
    lines.push(
        HEADERS
            .iter()
            .map(|header| escape_csv_field(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    lines.extend(entries.iter().map(entry_row));
    lines.push(summary_row(&story_average(entries)));

    Ok(lines.join("\n"))
}

fn entry_row(entry: &LogEntry) -> String {
    let mut cells = vec![
        format_timestamp(&entry.timestamp),
        entry.page_url.clone(),
        entry.original_url.clone(),
        entry.encoded.clone(),
        if entry.qa_approved { "Yes" } else { "No" }.to_string(),
    ];
    cells.extend(
        ResultField::ALL
            .iter()
            .map(|field| entry.api_results.get(*field).to_string()),
    );

    cells
        .iter()
        .map(|cell| escape_csv_field(cell))
        .collect::<Vec<_>>()
        .join(",")
}

/// Mean numeric Story over QA-approved entries, or `N/A` when there is none.
fn story_average(entries: &[LogEntry]) -> String {
    let stories: Vec<f64> = entries
        .iter()
        .filter(|entry| entry.qa_approved)
        .filter_map(|entry| entry.api_results.story.as_number())
        .collect();

    if stories.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    let mean = stories.iter().sum::<f64>() / stories.len() as f64;
    format!("{mean:.prec$}", prec = AVERAGE_PRECISION)
}

fn summary_row(average: &str) -> String {
    let mut cells = vec![String::new(); HEADERS.len()];
    cells[4] = STORY_AVERAGE_LABEL.to_string();
    cells[7] = escape_csv_field(average);
    cells.join(",")
}

/// Render and write `img-audit-logs-<today>.csv` under `dir`.
pub fn export_to_dir(
    entries: &[LogEntry],
    dir: &Path,
    today: NaiveDate,
) -> Result<PathBuf, ExportError> {
    let csv = render_csv(entries)?;
    let path = dir.join(csv_file_name(today));

    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, csv).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    info!(
        "Exported {} entries to {} ({CSV_MIME})",
        entries.len(),
        path.display()
    );
    Ok(path)
}

/// Today's date for the export file name (UTC, like an ISO date prefix).
pub fn export_date() -> NaiveDate {
    Utc::now().date_naive()
}
