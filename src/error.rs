//! Error types for the cache and socket layers
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors surfaced by cache operations.
///
/// A missing or expired key is not an error; `get` returns `Ok(None)`.
/// `NotFound` and `InvalidRequest` are only produced by the status API.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent or expired, as reported over HTTP
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The storage engine could not be opened or upgraded
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A set/delete/clear transaction aborted
    #[error("Storage write failed: {0}")]
    StorageWriteFailed(String),

    /// A read transaction failed
    #[error("Storage read failed: {0}")]
    StorageReadFailed(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (blocking task panicked, lock poisoned)
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::StorageWriteFailed(_) | CacheError::StorageReadFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Transport Error Enum ==
/// Socket-level failures. These never cross the public `SocketClient` API;
/// they are logged and turned into a Closed transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_unavailable_maps_to_503() {
        let response = CacheError::StorageUnavailable("disk gone".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_write_failure_maps_to_500() {
        let response = CacheError::StorageWriteFailed("aborted".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_errors_map_to_client_statuses() {
        let response = CacheError::NotFound("coaching/k".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = CacheError::InvalidRequest("bad store".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_messages() {
        let err = CacheError::StorageUnavailable("locked".to_string());
        assert_eq!(err.to_string(), "Storage unavailable: locked");
        assert_eq!(
            TransportError::Connect("refused".to_string()).to_string(),
            "Connection failed: refused"
        );
    }
}
