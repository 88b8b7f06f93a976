//! API Handlers
//!
//! HTTP request handlers for the status and cache inspection endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheManager, StoreName};
use crate::error::{CacheError, Result};
use crate::models::{CacheStatus, DeleteResponse, EntryResponse, HealthResponse, StatusResponse};
use crate::socket::SocketClient;

/// Application state shared across all handlers.
///
/// Holds the process-wide cache and the channel clients owned by the
/// composition root.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    pub channels: Vec<SocketClient>,
}

impl AppState {
    pub fn new(cache: Arc<CacheManager>, channels: Vec<SocketClient>) -> Self {
        Self { cache, channels }
    }
}

fn parse_store(name: &str) -> Result<StoreName> {
    name.parse().map_err(CacheError::InvalidRequest)
}

/// Handler for GET /cache/:store/:key
///
/// Reads through the cache, so an expired entry is evicted and reported missing.
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path((store, key)): Path<(String, String)>,
) -> Result<Json<EntryResponse>> {
    let store = parse_store(&store)?;
    let data: Value = state
        .cache
        .get(store, &key)
        .await?
        .ok_or_else(|| CacheError::NotFound(format!("{}/{}", store, key)))?;

    Ok(Json(EntryResponse::new(store, key, data)))
}

/// Handler for DELETE /cache/:store/:key
pub async fn delete_entry_handler(
    State(state): State<AppState>,
    Path((store, key)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    let store = parse_store(&store)?;
    state.cache.delete(store, &key).await?;

    Ok(Json(DeleteResponse::key(store, key)))
}

/// Handler for DELETE /cache/:store
pub async fn clear_store_handler(
    State(state): State<AppState>,
    Path(store): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let store = parse_store(&store)?;
    state.cache.clear(store).await?;

    Ok(Json(DeleteResponse::store(store)))
}

/// Handler for GET /status
///
/// Returns cache statistics, per-store entry counts and channel states.
pub async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let mut entries = BTreeMap::new();
    for store in StoreName::ALL {
        entries.insert(store, state.cache.len(store).await?);
    }

    Ok(Json(StatusResponse {
        cache: CacheStatus::new(
            state.cache.stats(),
            entries,
            state.cache.default_ttl_minutes(),
        ),
        channels: state.channels.iter().map(SocketClient::status).collect(),
    }))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
