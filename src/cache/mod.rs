//! Cache Module
//!
//! Durable, namespaced key-value cache with TTL expiry and lazy eviction.

mod clock;
mod entry;
mod manager;
mod sqlite;
mod stats;
mod storage;
mod stores;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, MS_PER_MINUTE};
pub use manager::{CacheManager, DEFAULT_TTL_MINUTES};
pub use sqlite::{SqliteEngine, SqliteStorage};
pub use stats::CacheStats;
pub use storage::{MemoryStorage, StorageEngine, StorageOpener, StoredEntry};
pub use stores::{StoreName, DB_NAME, SCHEMA_VERSION};
