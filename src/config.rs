//! Configuration Module
//!
//! Handles loading the composition root's settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::socket::ReconnectPolicy;

/// Runtime configuration for the cache and the channel clients.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file backing the cache; `None` keeps the cache in memory
    pub cache_db_path: Option<PathBuf>,
    /// Default TTL in minutes for `set` calls without an explicit TTL
    pub default_ttl_minutes: u64,
    /// Mentorship channel endpoint
    pub mentorship_ws_url: String,
    /// Coaching channel endpoint
    pub coaching_ws_url: String,
    /// File holding the current access token, re-read on every connect
    pub access_token_file: Option<PathBuf>,
    /// Base delay before the first reconnect attempt, in milliseconds
    pub reconnect_base_delay_ms: u64,
    /// Maximum number of automatic reconnect attempts
    pub max_reconnect_attempts: u32,
    /// Status HTTP server port
    pub status_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DB_PATH` - SQLite cache file (default: unset, in-memory)
    /// - `CACHE_DEFAULT_TTL_MINUTES` - Default TTL in minutes (default: 60)
    /// - `MENTORSHIP_WS_URL` - Mentorship socket URL (default: ws://localhost:8000/ws/mentorship)
    /// - `COACHING_WS_URL` - Coaching socket URL (default: ws://localhost:8000/ws/coaching)
    /// - `ACCESS_TOKEN_FILE` - Access token file (default: unset, empty token)
    /// - `RECONNECT_BASE_DELAY_MS` - Backoff base delay (default: 1000)
    /// - `MAX_RECONNECT_ATTEMPTS` - Reconnect cap (default: 5)
    /// - `STATUS_PORT` - Status server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_db_path: env::var("CACHE_DB_PATH").ok().map(PathBuf::from),
            default_ttl_minutes: parse_var("CACHE_DEFAULT_TTL_MINUTES")
                .unwrap_or(defaults.default_ttl_minutes),
            mentorship_ws_url: env::var("MENTORSHIP_WS_URL")
                .unwrap_or(defaults.mentorship_ws_url),
            coaching_ws_url: env::var("COACHING_WS_URL").unwrap_or(defaults.coaching_ws_url),
            access_token_file: env::var("ACCESS_TOKEN_FILE").ok().map(PathBuf::from),
            reconnect_base_delay_ms: parse_var("RECONNECT_BASE_DELAY_MS")
                .unwrap_or(defaults.reconnect_base_delay_ms),
            max_reconnect_attempts: parse_var("MAX_RECONNECT_ATTEMPTS")
                .unwrap_or(defaults.max_reconnect_attempts),
            status_port: parse_var("STATUS_PORT").unwrap_or(defaults.status_port),
        }
    }

    /// Reconnect policy shared by both channel clients.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            self.max_reconnect_attempts,
        )
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_db_path: None,
            default_ttl_minutes: 60,
            mentorship_ws_url: "ws://localhost:8000/ws/mentorship".to_string(),
            coaching_ws_url: "ws://localhost:8000/ws/coaching".to_string(),
            access_token_file: None,
            reconnect_base_delay_ms: 1000,
            max_reconnect_attempts: 5,
            status_port: 3000,
        }
    }
}
