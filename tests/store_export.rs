use std::fs;

use imgaudit_lib::db::Database;
use imgaudit_lib::export::ExportError;
use imgaudit_lib::models::{ApiResults, BufferRecord, EntryPatch, ResultValue};
use imgaudit_lib::panel::Panel;
use imgaudit_lib::store::LogStore;

fn open(dir: &tempfile::TempDir) -> LogStore {
    LogStore::new(
        Database::new(dir.path().join("audit.sqlite3")).unwrap(),
        "imgAuditLogs",
    )
}

fn record(n: usize) -> BufferRecord {
    BufferRecord {
        page_url: format!("https://news.example/story-{n}"),
        original_url: format!("https://img.example.org/{n}.jpg"),
        encoded: format!("https://cdn.example/w_800/https%3A%2F%2Fimg.example.org%2F{n}.jpg"),
        timestamp: Some("2024-05-04T10:30:00.000Z".into()),
    }
}

fn story(value: f64) -> ApiResults {
    let mut results = ApiResults::default();
    results.story = ResultValue::Numeric(value);
    results.thumbnail = ResultValue::Numeric(0.5);
    results.width = ResultValue::Numeric(100.0);
    results
}

#[tokio::test]
async fn log_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = open(&dir);
        let entry = store.append_record(record(1)).await.unwrap();
        assert!(store.update(&entry.id, EntryPatch::qa(true)).await);
        entry.id
    };

    let store = open(&dir);
    let entries = store.get_all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert!(entries[0].qa_approved);
    assert_eq!(entries[0].timestamp, "2024-05-04T10:30:00.000Z");
}

#[tokio::test]
async fn export_writes_rows_and_qa_average() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let mut ids = Vec::new();
    for n in 0..3 {
        ids.push(store.append_record(record(n)).await.unwrap().id);
    }
    store.update(&ids[0], EntryPatch::results(story(0.25))).await;
    store.update(&ids[1], EntryPatch::results(story(0.75))).await;
    store.update(&ids[2], EntryPatch::results(story(0.99))).await;

    let panel = Panel::new(store.clone());
    assert!(panel.set_qa(&ids[0], true).await);
    assert!(panel.set_qa(&ids[1], true).await);
    assert!(!panel.set_qa("missing", true).await);

    let out = tempfile::tempdir().unwrap();
    let path = panel.export(out.path()).await.unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("img-audit-logs-") && name.ends_with(".csv"));

    let csv = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = csv.split('\n').collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[1].starts_with("2024-05-"));
    assert!(lines[1].contains(",https://news.example/story-0,https://img.example.org/0.jpg,"));
    assert!(lines[1].contains(",Yes,0.5,N/A,0.25,100,N/A,N/A,N/A"));
    assert!(lines[3].contains(",No,"));
    assert_eq!(lines[4], ",,,,Story Average (QA Approved),,,0.500000,,,,");
}

#[tokio::test]
async fn export_of_empty_log_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let panel = Panel::new(open(&dir));
    let out = tempfile::tempdir().unwrap();

    let err = panel.export(out.path()).await.unwrap_err();
    assert!(matches!(err, ExportError::NoLogs));
    assert!(fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn legacy_html_results_are_reanalyzable() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.append_record(record(1)).await.unwrap();

    // Older panels stored the rendered markup instead of an object.
    let entries = store.get_all().await;
    let mut raw = serde_json::to_value(&entries).unwrap();
    raw[0]["apiResults"] = serde_json::Value::String("<div>Thumbnail: 0.4</div>".into());
    let db = Database::new(dir.path().join("audit.sqlite3")).unwrap();
    db.set_value("imgAuditLogs", raw.to_string()).await.unwrap();

    let entry = &store.get_all().await[0];
    assert!(entry.api_results.is_pending());
    assert!(imgaudit_lib::panel::needs_analysis(entry));
}

#[tokio::test]
async fn clear_via_panel_empties_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.append_record(record(1)).await.unwrap();

    let mut panel = Panel::new(store.clone());
    panel.clear().await;
    assert!(store.get_all().await.is_empty());
    assert!(panel.load().await.is_empty());
}
