//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use serde::{Deserialize, Serialize};

/// Milliseconds in one minute of TTL.
pub const MS_PER_MINUTE: u64 = 60_000;

// == Cache Entry ==
/// Represents a single cache entry with payload and expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Key, unique within its store
    pub key: String,
    /// The stored payload
    pub data: T,
    /// Write timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new cache entry written at `now` that lives for `ttl_minutes`.
    ///
    /// # Arguments
    /// * `key` - The key within its store
    /// * `data` - The payload to store
    /// * `ttl_minutes` - Lifetime in minutes
    /// * `now` - Write time in Unix milliseconds
    pub fn new(key: impl Into<String>, data: T, ttl_minutes: u64, now: u64) -> Self {
        Self {
            key: key.into(),
            data,
            timestamp: now,
            expires_at: now.saturating_add(ttl_minutes.saturating_mul(MS_PER_MINUTE)),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is still live at exactly `expires_at` and
    /// expired once `now > expires_at`, so a zero-minute TTL survives a read in
    /// the same millisecond it was written.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires_at
    }
}
