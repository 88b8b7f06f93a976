//! SQLite-backed storage engine.
//!
//! One table per store, keyed by `key`. The schema version lives in
//! `PRAGMA user_version`; upgrades only ever add tables.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::cache::storage::{StorageEngine, StorageOpener, StoredEntry};
use crate::cache::{CacheEntry, StoreName};
use crate::error::{CacheError, Result};

/// Opens the cache database from a file on disk.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    path: PathBuf,
}

impl SqliteStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn table_name(store: StoreName) -> String {
    format!("store_{}", store.as_str())
}

fn to_sql_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn unavailable(err: rusqlite::Error) -> CacheError {
    CacheError::StorageUnavailable(err.to_string())
}

fn write_failed(err: rusqlite::Error) -> CacheError {
    CacheError::StorageWriteFailed(err.to_string())
}

fn read_failed(err: rusqlite::Error) -> CacheError {
    CacheError::StorageReadFailed(err.to_string())
}

impl StorageOpener for SqliteStorage {
    fn open(
        &self,
        db_name: &str,
        version: u32,
        stores: &[StoreName],
    ) -> Result<Arc<dyn StorageEngine>> {
        let mut conn = Connection::open(&self.path).map_err(unavailable)?;

        let current: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(unavailable)?;
        if current > version {
            return Err(CacheError::StorageUnavailable(format!(
                "'{}' is at version {}, requested {}",
                db_name, current, version
            )));
        }

        if current < version {
            info!(
                "Upgrading cache database '{}' at {} from v{} to v{}",
                db_name,
                self.path.display(),
                current,
                version
            );
            let tx = conn.transaction().map_err(unavailable)?;
            for store in stores {
                tx.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {}(
                        key TEXT PRIMARY KEY NOT NULL,
                        data TEXT NOT NULL,
                        timestamp INTEGER NOT NULL,
                        expires_at INTEGER NOT NULL
                    );",
                    table_name(*store)
                ))
                .map_err(unavailable)?;
            }
            tx.execute_batch(&format!("PRAGMA user_version = {};", version))
                .map_err(unavailable)?;
            tx.commit().map_err(unavailable)?;
        } else {
            debug!("Cache database '{}' already at v{}", db_name, current);
        }

        Ok(Arc::new(SqliteEngine {
            conn: Mutex::new(conn),
        }))
    }
}

/// An open SQLite cache database.
#[derive(Debug)]
pub struct SqliteEngine {
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Internal("connection lock poisoned".to_string()))
    }
}

impl StorageEngine for SqliteEngine {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<StoredEntry>> {
        let conn = self.lock()?;
        let row: Option<(String, i64, i64)> = conn
            .query_row(
                &format!(
                    "SELECT data, timestamp, expires_at FROM {} WHERE key = ?1",
                    table_name(store)
                ),
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(read_failed)?;

        match row {
            Some((data, timestamp, expires_at)) => Ok(Some(CacheEntry {
                key: key.to_string(),
                data: serde_json::from_str(&data)?,
                timestamp: timestamp.max(0) as u64,
                expires_at: expires_at.max(0) as u64,
            })),
            None => Ok(None),
        }
    }

    fn put(&self, store: StoreName, entry: &StoredEntry) -> Result<()> {
        let data = serde_json::to_string(&entry.data)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {}(key, data, timestamp, expires_at) VALUES (?1, ?2, ?3, ?4)",
                table_name(store)
            ),
            params![
                entry.key,
                data,
                to_sql_ms(entry.timestamp),
                to_sql_ms(entry.expires_at)
            ],
        )
        .map_err(write_failed)?;
        Ok(())
    }

    fn delete(&self, store: StoreName, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?1", table_name(store)),
            params![key],
        )
        .map_err(write_failed)?;
        Ok(())
    }

    fn delete_if_unchanged(&self, store: StoreName, stale: &StoredEntry) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                &format!(
                    "DELETE FROM {} WHERE key = ?1 AND timestamp = ?2 AND expires_at = ?3",
                    table_name(store)
                ),
                params![
                    stale.key,
                    to_sql_ms(stale.timestamp),
                    to_sql_ms(stale.expires_at)
                ],
            )
            .map_err(write_failed)?;
        Ok(removed > 0)
    }

    fn clear(&self, store: StoreName) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {}", table_name(store)), [])
            .map_err(write_failed)?;
        Ok(())
    }

    fn len(&self, store: StoreName) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(1) FROM {}", table_name(store)), [], |row| {
                row.get(0)
            })
            .map_err(read_failed)?;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_storage() -> (tempfile::TempDir, SqliteStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path().join("cache.db"));
        (dir, storage)
    }

    #[test]
    fn test_put_get_delete() {
        let (_dir, storage) = temp_storage();
        let engine = storage.open("test_db", 1, &StoreName::ALL).unwrap();

        let entry = CacheEntry::new("nudges_42", json!([{"id": 1}]), 1, 1_000);
        engine.put(StoreName::Coaching, &entry).unwrap();

        let loaded = engine.get(StoreName::Coaching, "nudges_42").unwrap().unwrap();
        assert_eq!(loaded, entry);

        engine.delete(StoreName::Coaching, "nudges_42").unwrap();
        engine.delete(StoreName::Coaching, "nudges_42").unwrap();
        assert!(engine.get(StoreName::Coaching, "nudges_42").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let (_dir, storage) = temp_storage();
        let engine = storage.open("test_db", 1, &StoreName::ALL).unwrap();

        engine
            .put(StoreName::Analytics, &CacheEntry::new("k", json!(1), 1, 0))
            .unwrap();
        engine
            .put(StoreName::Analytics, &CacheEntry::new("k", json!(2), 1, 0))
            .unwrap();

        assert_eq!(engine.len(StoreName::Analytics).unwrap(), 1);
        let loaded = engine.get(StoreName::Analytics, "k").unwrap().unwrap();
        assert_eq!(loaded.data, json!(2));
    }

    #[test]
    fn test_expired_delete_skips_newer_write() {
        let (_dir, storage) = temp_storage();
        let engine = storage.open("test_db", 1, &StoreName::ALL).unwrap();

        let stale = CacheEntry::new("k", json!(1), 0, 1_000);
        engine.put(StoreName::Mentorship, &stale).unwrap();
        engine
            .put(StoreName::Mentorship, &CacheEntry::new("k", json!(2), 10, 2_000))
            .unwrap();

        assert!(!engine.delete_if_unchanged(StoreName::Mentorship, &stale).unwrap());
        let loaded = engine.get(StoreName::Mentorship, "k").unwrap().unwrap();
        assert_eq!(loaded.data, json!(2));

        let current = loaded.clone();
        assert!(engine.delete_if_unchanged(StoreName::Mentorship, &current).unwrap());
        assert_eq!(engine.len(StoreName::Mentorship).unwrap(), 0);
    }

    #[test]
    fn test_clear_only_touches_one_store() {
        let (_dir, storage) = temp_storage();
        let engine = storage.open("test_db", 1, &StoreName::ALL).unwrap();

        engine
            .put(StoreName::Coaching, &CacheEntry::new("k", json!(1), 1, 0))
            .unwrap();
        engine
            .put(StoreName::Mentorship, &CacheEntry::new("k", json!(2), 1, 0))
            .unwrap();

        engine.clear(StoreName::Coaching).unwrap();
        engine.clear(StoreName::Coaching).unwrap();

        assert_eq!(engine.len(StoreName::Coaching).unwrap(), 0);
        assert_eq!(engine.len(StoreName::Mentorship).unwrap(), 1);
    }

    #[test]
    fn test_reopen_preserves_data_and_version() {
        let (_dir, storage) = temp_storage();
        {
            let engine = storage.open("test_db", 1, &StoreName::ALL).unwrap();
            engine
                .put(StoreName::Notifications, &CacheEntry::new("k", json!("v"), 1, 0))
                .unwrap();
        }

        let engine = storage.open("test_db", 1, &StoreName::ALL).unwrap();
        assert!(engine.get(StoreName::Notifications, "k").unwrap().is_some());
    }

    #[test]
    fn test_upgrade_adds_stores_without_losing_data() {
        let (_dir, storage) = temp_storage();
        {
            let engine = storage.open("test_db", 1, &[StoreName::Coaching]).unwrap();
            engine
                .put(StoreName::Coaching, &CacheEntry::new("k", json!(7), 1, 0))
                .unwrap();
            assert!(engine.len(StoreName::Analytics).is_err());
        }

        let engine = storage.open("test_db", 2, &StoreName::ALL).unwrap();
        assert_eq!(engine.len(StoreName::Analytics).unwrap(), 0);
        let loaded = engine.get(StoreName::Coaching, "k").unwrap().unwrap();
        assert_eq!(loaded.data, json!(7));
    }

    #[test]
    fn test_downgrade_rejected() {
        let (_dir, storage) = temp_storage();
        storage.open("test_db", 3, &StoreName::ALL).unwrap();

        let result = storage.open("test_db", 1, &StoreName::ALL);
        assert!(matches!(result, Err(CacheError::StorageUnavailable(_))));
    }

    #[test]
    fn test_unopenable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path().join("missing").join("cache.db"));

        let result = storage.open("test_db", 1, &StoreName::ALL);
        assert!(matches!(result, Err(CacheError::StorageUnavailable(_))));
    }
}
