//! API Module
//!
//! HTTP status surface of the sync agent.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /status` - Cache statistics and channel states
//! - `GET /cache/:store/:key` - Read a cached payload
//! - `DELETE /cache/:store/:key` - Delete one entry
//! - `DELETE /cache/:store` - Clear a store

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
