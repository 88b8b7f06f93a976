//! Dashboard Sync - offline cache and resilient channel client
//!
//! Composition root: owns the process-wide cache and the mentorship and
//! coaching channel clients, and serves their status over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashboard_sync::api::{create_router, AppState};
use dashboard_sync::cache::{CacheManager, MemoryStorage, SqliteStorage};
use dashboard_sync::config::Config;
use dashboard_sync::socket::{
    FileToken, SocketClient, StaticToken, TokenSource, WebSocketTransport,
};

/// Main entry point for the dashboard sync agent.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache over SQLite (or memory when no path is set)
/// 4. Create and connect the channel clients
/// 5. Serve the status API on the configured port
/// 6. On SIGINT/SIGTERM, disconnect the channels and exit
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dashboard sync agent");

    let config = Config::from_env();
    info!(
        "Configuration loaded: cache_db={:?}, default_ttl={}m, reconnect_base={}ms, max_reconnects={}, port={}",
        config.cache_db_path,
        config.default_ttl_minutes,
        config.reconnect_base_delay_ms,
        config.max_reconnect_attempts,
        config.status_port
    );

    let cache = match &config.cache_db_path {
        Some(path) => CacheManager::new(SqliteStorage::new(path)),
        None => {
            warn!("CACHE_DB_PATH not set, cache will not survive restarts");
            CacheManager::new(MemoryStorage::new())
        }
    };
    let cache = Arc::new(cache.with_default_ttl(config.default_ttl_minutes));

    let mentorship = channel("mentorship", &config.mentorship_ws_url, &config);
    let coaching = channel("coaching", &config.coaching_ws_url, &config);
    mentorship.connect();
    coaching.connect();

    let channels = vec![mentorship, coaching];
    let app = create_router(AppState::new(cache, channels.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.status_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Status server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("status server failed")?;

    for client in &channels {
        client.disconnect();
    }
    info!("Shutdown complete");
    Ok(())
}

fn token_source(config: &Config) -> Box<dyn TokenSource> {
    match &config.access_token_file {
        Some(path) => Box::new(FileToken::new(path)),
        None => Box::new(StaticToken::none()),
    }
}

fn channel(name: &str, url: &str, config: &Config) -> SocketClient {
    let client = SocketClient::new(
        name,
        url,
        WebSocketTransport,
        token_source(config),
        config.reconnect_policy(),
    );

    let label = client.name().to_string();
    client.on_reconnect_exhausted(move || {
        warn!("[{}] channel gave up reconnecting; restart or reconnect manually", label);
    });
    client
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
