pub mod api_results;
pub mod log_entry;

pub use api_results::{ApiResults, ResultField, ResultValue, NOT_AVAILABLE};
pub use log_entry::{iso_timestamp, new_entry_id, BufferRecord, EntryPatch, LogEntry};

// Sentinels written in place of an original URL or a results block.
pub const NO_EXTRACT: &str = "Could not extract original URL";
pub const NO_SLIDE: &str = "No active slide image found";
pub const NO_VALID_URL: &str = "No valid image URL to analyze";
pub const NO_LOGS: &str = "No logs to export";
