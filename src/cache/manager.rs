//! Cache Manager Module
//!
//! Namespaced TTL cache over a lazily opened storage engine.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cache::stats::StatsRecorder;
use crate::cache::storage::{StorageEngine, StorageOpener};
use crate::cache::{CacheEntry, CacheStats, Clock, StoreName, SystemClock, DB_NAME, SCHEMA_VERSION};
use crate::error::{CacheError, Result};

/// Default TTL applied when `set` is called without one.
pub const DEFAULT_TTL_MINUTES: u64 = 60;

// == Cache Manager ==
/// Durable, namespaced, TTL-expiring cache.
///
/// The engine is opened on the first operation. Concurrent first callers wait
/// on the same open; a failed open is not remembered, so the next operation
/// tries again.
pub struct CacheManager {
    opener: Arc<dyn StorageOpener>,
    engine: OnceCell<Arc<dyn StorageEngine>>,
    clock: Arc<dyn Clock>,
    stats: StatsRecorder,
    default_ttl_minutes: u64,
}

impl CacheManager {
    // == Constructor ==
    /// Creates a manager over `opener` using the wall clock.
    pub fn new(opener: impl StorageOpener) -> Self {
        Self::with_clock(opener, SystemClock)
    }

    /// Creates a manager with an explicit time source.
    pub fn with_clock(opener: impl StorageOpener, clock: impl Clock) -> Self {
        Self {
            opener: Arc::new(opener),
            engine: OnceCell::new(),
            clock: Arc::new(clock),
            stats: StatsRecorder::default(),
            default_ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }

    /// Overrides the TTL used by `set(.., None)`.
    pub fn with_default_ttl(mut self, minutes: u64) -> Self {
        self.default_ttl_minutes = minutes;
        self
    }

    pub fn default_ttl_minutes(&self) -> u64 {
        self.default_ttl_minutes
    }

    // == Initialization ==
    async fn engine(&self) -> Result<Arc<dyn StorageEngine>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let opener = Arc::clone(&self.opener);
                let engine = tokio::task::spawn_blocking(move || {
                    opener.open(DB_NAME, SCHEMA_VERSION, &StoreName::ALL)
                })
                .await
                .map_err(|e| CacheError::Internal(format!("open task failed: {}", e)))?;

                match &engine {
                    Ok(_) => info!("Cache database '{}' opened at v{}", DB_NAME, SCHEMA_VERSION),
                    Err(e) => warn!("Cache database '{}' failed to open: {}", DB_NAME, e),
                }
                engine
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    /// Runs one engine transaction on the blocking pool.
    async fn run<R, F>(&self, op: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn StorageEngine) -> Result<R> + Send + 'static,
    {
        let engine = self.engine().await?;
        tokio::task::spawn_blocking(move || op(engine.as_ref()))
            .await
            .map_err(|e| CacheError::Internal(format!("storage task failed: {}", e)))?
    }

    // == Set ==
    /// Stores `data` under `key` in `store`, overwriting any previous entry.
    ///
    /// # Arguments
    /// * `store` - Namespace to write to
    /// * `key` - The key to store
    /// * `data` - Any serializable payload
    /// * `ttl_minutes` - Lifetime in minutes (uses the default if None)
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        store: StoreName,
        key: &str,
        data: &T,
        ttl_minutes: Option<u64>,
    ) -> Result<()> {
        let ttl = ttl_minutes.unwrap_or(self.default_ttl_minutes);
        let entry = CacheEntry::new(key, serde_json::to_value(data)?, ttl, self.clock.now_ms());

        self.run(move |engine| engine.put(store, &entry)).await?;
        debug!("Cache set {}/{} (ttl {}m)", store, key, ttl);
        Ok(())
    }

    // == Get ==
    /// Retrieves the payload for `key` in `store`.
    ///
    /// Returns `Ok(None)` for absent and expired keys. An expired entry is
    /// deleted before returning; failure of that delete is logged only.
    pub async fn get<T: DeserializeOwned>(&self, store: StoreName, key: &str) -> Result<Option<T>> {
        let owned_key = key.to_string();
        let entry = self.run(move |engine| engine.get(store, &owned_key)).await?;

        let Some(entry) = entry else {
            self.stats.record_miss();
            return Ok(None);
        };

        if entry.is_expired_at(self.clock.now_ms()) {
            self.stats.record_miss();
            match self
                .run(move |engine| engine.delete_if_unchanged(store, &entry))
                .await
            {
                Ok(true) => {
                    self.stats.record_expired_eviction();
                    debug!("Cache evicted expired {}/{}", store, key);
                }
                Ok(false) => debug!("Cache entry {}/{} rewritten before eviction", store, key),
                Err(e) => warn!("Failed to evict expired {}/{}: {}", store, key, e),
            }
            return Ok(None);
        }

        self.stats.record_hit();
        Ok(Some(serde_json::from_value(entry.data)?))
    }

    // == Delete ==
    /// Removes `key` from `store`. Absent keys are not an error.
    pub async fn delete(&self, store: StoreName, key: &str) -> Result<()> {
        let owned_key = key.to_string();
        self.run(move |engine| engine.delete(store, &owned_key)).await
    }

    // == Clear ==
    /// Removes every entry in `store`.
    pub async fn clear(&self, store: StoreName) -> Result<()> {
        self.run(move |engine| engine.clear(store)).await?;
        debug!("Cache cleared store {}", store);
        Ok(())
    }

    // == Length ==
    /// Number of stored entries in `store`, expired ones not yet read included.
    pub async fn len(&self, store: StoreName) -> Result<usize> {
        self.run(move |engine| engine.len(store)).await
    }

    // == Stats ==
    /// Returns current read statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Whether the engine has been opened.
    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("initialized", &self.is_initialized())
            .field("default_ttl_minutes", &self.default_ttl_minutes)
            .field("stats", &self.stats())
            .finish()
    }
}
