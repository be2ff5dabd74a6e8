//! Marketplace Backend Server
//!
//! Serves the booking, notification and messaging APIs plus the realtime
//! change feed, and runs the outbox retry worker and expiry sweeper.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use marketplace_server::auth::AuthService;
use marketplace_server::booking::expiry_sweeper;
use marketplace_server::build_router;
use marketplace_server::config::{Config, StoreBackend};
use marketplace_server::feed::ChangeFeed;
use marketplace_server::middleware::RateLimiter;
use marketplace_server::notification::outbox_retry_worker;
use marketplace_server::state::AppState;
use marketplace_server::store::{MarketplaceStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting marketplace server");

    let store: Arc<dyn MarketplaceStore> = match config.store_backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database at {}", config.database_url_masked());
            let store = PgStore::connect(&config.database_url, config.db_max_connections)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let feed = ChangeFeed::new(config.feed_channel_capacity);
    let auth_service = Arc::new(AuthService::new(config.jwt_secret.clone()));
    let app_state = AppState::new(store, auth_service, feed);

    // Background workers
    let retry_worker = tokio::spawn(outbox_retry_worker(
        (*app_state.notification_service).clone(),
        config.outbox_retry_interval,
    ));
    let sweeper = tokio::spawn(expiry_sweeper(
        (*app_state.booking_service).clone(),
        config.expiry_sweep_interval,
    ));

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    let cleanup_limiter = rate_limiter.clone();
    let limiter_cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let removed = cleanup_limiter.cleanup(Duration::from_secs(600)).await;
            tracing::debug!(removed, "Rate limiter buckets cleaned up");
        }
    });

    let app = build_router(app_state, &config, rate_limiter);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("WebSocket available at ws://{}/ws", addr);
    tracing::info!("Health check at http://{}/health", addr);

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    retry_worker.abort();
    sweeper.abort();
    limiter_cleanup.abort();

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
