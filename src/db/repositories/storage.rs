use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::Database;

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM storage WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .with_context(|| format!("failed to read storage key {key}"))
}

fn write_value(conn: &Connection, key: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => conn
            .execute(
                "INSERT INTO storage (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write storage key {key}"))?,
        None => conn
            .execute("DELETE FROM storage WHERE key = ?1", params![key])
            .with_context(|| format!("failed to remove storage key {key}"))?,
    };
    Ok(())
}

impl Database {
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| read_value(conn, &key)).await
    }

    pub async fn set_value(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| write_value(conn, &key, Some(&value)))
            .await
    }

    pub async fn remove_value(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| write_value(conn, &key, None)).await
    }

    /// Read-modify-write of one key inside a single transaction. `modify`
    /// receives the current value and returns the replacement (`None`
    /// removes the key) plus a result for the caller.
    pub async fn modify_value<F, T>(&self, key: &str, modify: F) -> Result<T>
    where
        F: FnOnce(Option<String>) -> Result<(Option<String>, T)> + Send + 'static,
        T: Send + 'static,
    {
        let key = key.to_string();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open storage transaction")?;
            let current = read_value(&tx, &key)?;
            let (next, output) = modify(current)?;
            write_value(&tx, &key, next.as_deref())?;
            tx.commit().context("failed to commit storage transaction")?;
            Ok(output)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("test.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn set_get_remove() {
        let (_dir, db) = open();
        assert_eq!(db.get_value("k").await.unwrap(), None);

        db.set_value("k", "[1]".into()).await.unwrap();
        db.set_value("k", "[1,2]".into()).await.unwrap();
        assert_eq!(db.get_value("k").await.unwrap().as_deref(), Some("[1,2]"));

        db.remove_value("k").await.unwrap();
        assert_eq!(db.get_value("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn modify_sees_current_value() {
        let (_dir, db) = open();
        db.set_value("counter", "1".into()).await.unwrap();

        let previous = db
            .modify_value("counter", |current| {
                let n: i64 = current.as_deref().unwrap_or("0").parse()?;
                Ok((Some((n + 1).to_string()), n))
            })
            .await
            .unwrap();

        assert_eq!(previous, 1);
        assert_eq!(db.get_value("counter").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn failed_modify_leaves_value_untouched() {
        let (_dir, db) = open();
        db.set_value("k", "keep".into()).await.unwrap();

        let result = db
            .modify_value::<_, ()>("k", |_| Err(anyhow::anyhow!("boom")))
            .await;
        assert!(result.is_err());
        assert_eq!(db.get_value("k").await.unwrap().as_deref(), Some("keep"));
    }
}
