//! Audit log persistence.
//!
//! The whole log is one JSON array under a single storage key. Every
//! operation is a whole-collection read-modify-write executed as one task on
//! the database thread. Storage failures are logged and degrade to
//! empty reads / skipped writes; they never reach the panel.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, warn};
use serde_json::Value;

use crate::db::Database;
use crate::models::{new_entry_id, BufferRecord, EntryPatch, LogEntry};

#[derive(Clone)]
pub struct LogStore {
    db: Database,
    key: Arc<str>,
}

impl LogStore {
    pub fn new(db: Database, key: &str) -> Self {
        Self {
            db,
            key: Arc::from(key),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// All entries in insertion order.
    pub async fn get_all(&self) -> Vec<LogEntry> {
        match self.db.get_value(&self.key).await {
            Ok(raw) => parse_entries(raw.as_deref()),
            Err(err) => {
                error!("Error reading audit log: {err:#}");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<LogEntry> {
        self.get_all().await.into_iter().find(|entry| entry.id == id)
    }

    pub async fn len(&self) -> usize {
        self.get_all().await.len()
    }

    /// Turn a drained buffer record into an entry and append it.
    pub async fn append_record(&self, record: BufferRecord) -> Option<LogEntry> {
        self.append(LogEntry::from_record(record, Utc::now())).await
    }

    /// Append an entry, assigning an id if it has none. Returns the stored
    /// entry, or `None` when the write failed.
    pub async fn append(&self, mut entry: LogEntry) -> Option<LogEntry> {
        if entry.id.is_empty() {
            entry.id = new_entry_id();
        }
        let stored = entry.clone();

        let result = self
            .db
            .modify_value(&self.key, move |raw| {
                let mut entries = parse_entries(raw.as_deref());
                entries.push(entry);
                Ok((Some(serialize_entries(&entries)?), ()))
            })
            .await;

        match result {
            Ok(()) => Some(stored),
            Err(err) => {
                error!("Error saving audit log entry {}: {err:#}", stored.id);
                None
            }
        }
    }

    /// Merge `patch` into the entry with `id`. Returns `false` when no such
    /// entry exists (e.g. the log was cleared meanwhile) or the write failed.
    pub async fn update(&self, id: &str, patch: EntryPatch) -> bool {
        let target = id.to_string();
        let result = self
            .db
            .modify_value(&self.key, move |raw| {
                let mut entries = parse_entries(raw.as_deref());
                let Some(entry) = entries.iter_mut().find(|entry| entry.id == target) else {
                    return Ok((raw, false));
                };
                patch.apply(entry);
                Ok((Some(serialize_entries(&entries)?), true))
            })
            .await;

        match result {
            Ok(updated) => updated,
            Err(err) => {
                error!("Error updating audit log entry {id}: {err:#}");
                false
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(err) = self.db.remove_value(&self.key).await {
            error!("Error clearing audit log: {err:#}");
        }
    }
}

fn parse_entries(raw: Option<&str>) -> Vec<LogEntry> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let items = match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(items) => items,
        Err(err) => {
            warn!("Stored audit log is not a JSON array ({err}); treating as empty");
            return Vec::new();
        }
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<LogEntry>(item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Dropping unreadable audit log entry: {err}");
                None
            }
        })
        .collect()
}

fn serialize_entries(entries: &[LogEntry]) -> Result<String> {
    serde_json::to_string(entries).context("failed to serialize audit log")
}
