//! Storage Engine Module
//!
//! The durable key-value engine the cache sits on, plus an in-memory engine
//! with the same semantics.
//!
//! An engine is opened by name and schema version. Opening runs an additive
//! upgrade that creates one logical store per [`StoreName`] if absent, and
//! never drops data already present.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheEntry, StoreName};
use crate::error::{CacheError, Result};

/// Entry as persisted by an engine: payload kept as a JSON value.
pub type StoredEntry = CacheEntry<Value>;

// == Engine Traits ==
/// An opened database. Every call is one short transaction.
pub trait StorageEngine: Send + Sync + 'static {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<StoredEntry>>;

    /// Inserts or overwrites the entry under `entry.key`.
    fn put(&self, store: StoreName, entry: &StoredEntry) -> Result<()>;

    /// Removes `key`; absent keys are not an error.
    fn delete(&self, store: StoreName, key: &str) -> Result<()>;

    /// Removes `stale.key` only while the stored entry still carries `stale`'s
    /// timestamps, so a write landing after the expired read survives.
    /// Returns whether a row was removed.
    fn delete_if_unchanged(&self, store: StoreName, stale: &StoredEntry) -> Result<bool>;

    /// Removes every entry in `store`.
    fn clear(&self, store: StoreName) -> Result<()>;

    /// Number of entries in `store`, expired ones included.
    fn len(&self, store: StoreName) -> Result<usize>;
}

/// Opens (creating and upgrading as needed) a named, versioned database.
pub trait StorageOpener: Send + Sync + 'static {
    fn open(
        &self,
        db_name: &str,
        version: u32,
        stores: &[StoreName],
    ) -> Result<Arc<dyn StorageEngine>>;
}

// == Memory Storage ==
#[derive(Debug, Default)]
struct MemoryState {
    version: u32,
    stores: HashMap<StoreName, HashMap<String, StoredEntry>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Mutex<MemoryState>,
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
    fail_writes: AtomicBool,
    open_delay_ms: AtomicUsize,
}

/// In-memory database with the same open/upgrade semantics as the durable
/// engine. Clones share contents, so data survives re-opening the way a
/// per-origin database survives a page reload.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open/upgrade sequences run so far.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Makes the next `count` opens fail with `StorageUnavailable`.
    pub fn fail_next_opens(&self, count: usize) {
        self.inner.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Makes every write transaction abort until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Slows down each open, widening the window for concurrent first callers.
    pub fn set_open_delay(&self, delay: Duration) {
        self.inner
            .open_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Current schema version, 0 if never opened.
    pub fn version(&self) -> u32 {
        self.lock().map(|state| state.version).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.inner
            .state
            .lock()
            .map_err(|_| CacheError::Internal("memory storage lock poisoned".to_string()))
    }

    fn check_writable(&self) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::StorageWriteFailed(
                "transaction aborted".to_string(),
            ));
        }
        Ok(())
    }
}

fn missing_store(store: StoreName) -> CacheError {
    CacheError::StorageReadFailed(format!("store '{}' does not exist", store))
}

impl StorageOpener for MemoryStorage {
    fn open(
        &self,
        db_name: &str,
        version: u32,
        stores: &[StoreName],
    ) -> Result<Arc<dyn StorageEngine>> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }

        let failing = self.inner.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.inner.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(CacheError::StorageUnavailable(format!(
                "failed to open '{}'",
                db_name
            )));
        }

        let mut state = self.lock()?;
        if state.version > version {
            return Err(CacheError::StorageUnavailable(format!(
                "'{}' is at version {}, requested {}",
                db_name, state.version, version
            )));
        }
        if state.version < version {
            debug!("Upgrading '{}' from v{} to v{}", db_name, state.version, version);
            for store in stores {
                state.stores.entry(*store).or_default();
            }
            state.version = version;
        }
        drop(state);

        Ok(Arc::new(self.clone()))
    }
}

impl StorageEngine for MemoryStorage {
    fn get(&self, store: StoreName, key: &str) -> Result<Option<StoredEntry>> {
        let state = self.lock()?;
        let entries = state.stores.get(&store).ok_or_else(|| missing_store(store))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, store: StoreName, entry: &StoredEntry) -> Result<()> {
        self.check_writable()?;
        let mut state = self.lock()?;
        let entries = state
            .stores
            .get_mut(&store)
            .ok_or_else(|| missing_store(store))?;
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn delete(&self, store: StoreName, key: &str) -> Result<()> {
        self.check_writable()?;
        let mut state = self.lock()?;
        let entries = state
            .stores
            .get_mut(&store)
            .ok_or_else(|| missing_store(store))?;
        entries.remove(key);
        Ok(())
    }

    fn delete_if_unchanged(&self, store: StoreName, stale: &StoredEntry) -> Result<bool> {
        self.check_writable()?;
        let mut state = self.lock()?;
        let entries = state
            .stores
            .get_mut(&store)
            .ok_or_else(|| missing_store(store))?;
        let unchanged = entries.get(&stale.key).is_some_and(|current| {
            current.timestamp == stale.timestamp && current.expires_at == stale.expires_at
        });
        if unchanged {
            entries.remove(&stale.key);
        }
        Ok(unchanged)
    }

    fn clear(&self, store: StoreName) -> Result<()> {
        self.check_writable()?;
        let mut state = self.lock()?;
        let entries = state
            .stores
            .get_mut(&store)
            .ok_or_else(|| missing_store(store))?;
        entries.clear();
        Ok(())
    }

    fn len(&self, store: StoreName) -> Result<usize> {
        let state = self.lock()?;
        let entries = state.stores.get(&store).ok_or_else(|| missing_store(store))?;
        Ok(entries.len())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open(storage: &MemoryStorage) -> Arc<dyn StorageEngine> {
        storage.open("test_db", 1, &StoreName::ALL).unwrap()
    }

    #[test]
    fn test_open_creates_all_stores() {
        let storage = MemoryStorage::new();
        let engine = open(&storage);

        for store in StoreName::ALL {
            assert_eq!(engine.len(store).unwrap(), 0);
        }
        assert_eq!(storage.version(), 1);
        assert_eq!(storage.open_count(), 1);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let storage = MemoryStorage::new();
        let engine = open(&storage);
        engine
            .put(StoreName::Coaching, &CacheEntry::new("k", json!(1), 5, 0))
            .unwrap();

        let reopened = open(&storage);
        let entry = reopened.get(StoreName::Coaching, "k").unwrap().unwrap();
        assert_eq!(entry.data, json!(1));
        assert_eq!(storage.open_count(), 2);
    }

    #[test]
    fn test_upgrade_is_additive() {
        let storage = MemoryStorage::new();
        let engine = storage.open("test_db", 1, &[StoreName::Coaching]).unwrap();
        engine
            .put(StoreName::Coaching, &CacheEntry::new("k", json!("v"), 5, 0))
            .unwrap();
        assert!(engine.get(StoreName::Analytics, "k").is_err());

        let upgraded = storage.open("test_db", 2, &StoreName::ALL).unwrap();
        assert!(upgraded.get(StoreName::Coaching, "k").unwrap().is_some());
        assert_eq!(upgraded.len(StoreName::Analytics).unwrap(), 0);
    }

    #[test]
    fn test_downgrade_rejected() {
        let storage = MemoryStorage::new();
        storage.open("test_db", 2, &StoreName::ALL).unwrap();

        let result = storage.open("test_db", 1, &StoreName::ALL);
        assert!(matches!(result, Err(CacheError::StorageUnavailable(_))));
    }

    #[test]
    fn test_failing_opens_then_recovers() {
        let storage = MemoryStorage::new();
        storage.fail_next_opens(1);

        assert!(storage.open("test_db", 1, &StoreName::ALL).is_err());
        assert!(storage.open("test_db", 1, &StoreName::ALL).is_ok());
        assert_eq!(storage.open_count(), 2);
    }

    #[test]
    fn test_failed_writes_leave_data_intact() {
        let storage = MemoryStorage::new();
        let engine = open(&storage);
        engine
            .put(StoreName::Mentorship, &CacheEntry::new("k", json!(1), 5, 0))
            .unwrap();

        storage.set_fail_writes(true);
        let result = engine.clear(StoreName::Mentorship);
        assert!(matches!(result, Err(CacheError::StorageWriteFailed(_))));
        assert_eq!(engine.len(StoreName::Mentorship).unwrap(), 1);
    }

    #[test]
    fn test_delete_if_unchanged_spares_rewritten_entry() {
        let storage = MemoryStorage::new();
        let engine = open(&storage);
        let stale = CacheEntry::new("k", json!("old"), 0, 100);
        engine.put(StoreName::Coaching, &stale).unwrap();
        engine
            .put(StoreName::Coaching, &CacheEntry::new("k", json!("new"), 5, 200))
            .unwrap();

        assert!(!engine.delete_if_unchanged(StoreName::Coaching, &stale).unwrap());
        let current = engine.get(StoreName::Coaching, "k").unwrap().unwrap();
        assert_eq!(current.data, json!("new"));

        engine.put(StoreName::Coaching, &stale).unwrap();
        assert!(engine.delete_if_unchanged(StoreName::Coaching, &stale).unwrap());
        assert!(engine.get(StoreName::Coaching, "k").unwrap().is_none());
    }

    #[test]
    fn test_delete_absent_key_is_ok() {
        let storage = MemoryStorage::new();
        let engine = open(&storage);
        assert!(engine.delete(StoreName::Analytics, "missing").is_ok());
    }
}
