//! tagcache admin server
//!
//! Runs the caching engine with its expiry sweep and background workers,
//! and exposes the admin HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagcache::{create_router, spawn_cleanup_task, AppState, CacheStore, Config, StrategyEngine, WorkerPool};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the cache store (local-only if the backend is unreachable)
/// 4. Start the worker pool and expiry sweep
/// 5. Serve the admin router until SIGINT/SIGTERM
/// 6. Drain background work within the grace period
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tagcache");

    let config = Config::from_env();
    info!(
        max_local_entries = config.max_local_entries,
        default_ttl_secs = config.default_ttl,
        port = config.server_port,
        backend = config.redis_url.as_deref().unwrap_or("none"),
        "Configuration loaded"
    );

    let store = Arc::new(CacheStore::from_config(&config).await);
    let workers = WorkerPool::from_config(&config);
    let engine = Arc::new(StrategyEngine::from_config(store.clone(), workers, &config));

    let cleanup_handle = spawn_cleanup_task(store, config.cleanup_interval);
    info!("Background expiry sweep started");

    let app = create_router(AppState::new(engine.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup_handle.abort();
    warn!("Expiry sweep aborted");
    engine.shutdown(config.shutdown_grace()).await;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
