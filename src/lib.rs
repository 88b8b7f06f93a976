//! Dashboard Sync - offline cache and resilient channel client
//!
//! Provides a durable namespaced TTL cache and a WebSocket client with
//! backoff reconnect and outbound queuing, for dashboard widgets.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod socket;

pub use api::AppState;
pub use cache::{CacheManager, StoreName};
pub use config::Config;
pub use socket::SocketClient;
