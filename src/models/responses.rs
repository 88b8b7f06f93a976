//! Response DTOs for the status API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheStats, StoreName};
use crate::socket::ChannelStatus;

/// Response body for GET /cache/:store/:key
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub store: StoreName,
    pub key: String,
    /// The cached payload
    pub data: Value,
}

impl EntryResponse {
    pub fn new(store: StoreName, key: impl Into<String>, data: Value) -> Self {
        Self {
            store,
            key: key.into(),
            data,
        }
    }
}

/// Response body for DELETE /cache/:store and DELETE /cache/:store/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    pub store: StoreName,
    /// The key that was deleted; absent when the whole store was cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl DeleteResponse {
    pub fn key(store: StoreName, key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted from '{}'", key, store),
            store,
            key: Some(key),
        }
    }

    pub fn store(store: StoreName) -> Self {
        Self {
            message: format!("Store '{}' cleared", store),
            store,
            key: None,
        }
    }
}

/// Cache section of the status response
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub hits: u64,
    pub misses: u64,
    pub expired_evictions: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Stored entries per store, unread expired ones included
    pub entries: BTreeMap<StoreName, usize>,
    /// TTL applied to writes that do not pass one
    pub default_ttl_minutes: u64,
}

impl CacheStatus {
    pub fn new(
        stats: CacheStats,
        entries: BTreeMap<StoreName, usize>,
        default_ttl_minutes: u64,
    ) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            expired_evictions: stats.expired_evictions,
            entries,
            default_ttl_minutes,
        }
    }
}

/// Response body for the status endpoint (GET /status)
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub cache: CacheStatus,
    pub channels: Vec<ChannelStatus>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_response_serialize() {
        let resp = EntryResponse::new(StoreName::Coaching, "nudges_42", json!([{"id": 1}]));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            json!({"store": "coaching", "key": "nudges_42", "data": [{"id": 1}]})
        );
    }

    #[test]
    fn test_delete_response_variants() {
        let json = serde_json::to_value(DeleteResponse::key(StoreName::Analytics, "k")).unwrap();
        assert_eq!(json["key"], "k");

        let json = serde_json::to_value(DeleteResponse::store(StoreName::Analytics)).unwrap();
        assert!(json.get("key").is_none());
        assert!(json["message"].as_str().unwrap().contains("cleared"));
    }

    #[test]
    fn test_cache_status_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            expired_evictions: 5,
        };
        let resp = CacheStatus::new(stats, BTreeMap::new(), 60);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.default_ttl_minutes, 60);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
