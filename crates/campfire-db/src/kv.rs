use crate::Database;
use crate::models::KvRow;
use anyhow::Result;
use rusqlite::Connection;

/// Device-local key-value entries. Last write wins.
impl Database {
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| Ok(query_kv(conn, key)?.map(|row| row.value)))
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (key, value),
            )?;
            Ok(())
        })
    }

    pub fn kv_remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }
}

fn query_kv(conn: &Connection, key: &str) -> Result<Option<KvRow>> {
    let mut stmt = conn.prepare("SELECT key, value, updated_at FROM kv WHERE key = ?1")?;

    let mut rows = stmt.query_map([key], |row| {
        Ok(KvRow {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at: row.get(2)?,
        })
    })?;

    let row = rows.next().transpose()?;
    Ok(row)
}
