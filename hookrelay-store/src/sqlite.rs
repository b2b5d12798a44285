//! SQLite-backed ordered store.

use crate::{BatchOp, OrderedStore, Result, StoreError, WriteBatch};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable store keeping every pair in a single `kv` table.
///
/// Keys use SQLite's default binary collation, so scans come back in byte
/// order. `rusqlite::Connection` is not `Sync`, hence the mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        store.initialize()?;
        debug!(path = ?store.path, "Opened SQLite store");
        Ok(store)
    }

    /// In-memory database, mostly useful in tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        // journal_mode reports the new mode as a row; in-memory databases
        // stay on "memory" regardless.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn collect(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<(String, String)>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?;
        let pairs = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }
}

impl OrderedStore for SqliteStore {
    fn apply(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    tx.execute(
                        "INSERT INTO kv (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value],
                    )?;
                }
                BatchOp::Delete { key } => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                }
                BatchOp::DeletePrefix { prefix } => {
                    tx.execute(
                        "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
                        params![prefix],
                    )?;
                }
            }
        }
        // Dropping an uncommitted transaction rolls it back.
        tx.commit()?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        Self::collect(&conn, "SELECT key, value FROM kv ORDER BY key", [])
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        Self::collect(
            &conn,
            "SELECT key, value FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            params![prefix],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("hooks.db");

        let store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_upsert_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        store.apply(WriteBatch::new().put("k", "1")).unwrap();
        store.apply(WriteBatch::new().put("k", "2")).unwrap();
        assert_eq!(store.scan().unwrap(), vec![("k".into(), "2".into())]);
    }
}
