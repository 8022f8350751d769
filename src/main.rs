use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cafe_space_backend::build_app;
use cafe_space_backend::config::{Config, StorageBackend};
use cafe_space_backend::redis::{create_pool, health_check, redis_stores};
use cafe_space_backend::state::AppState;
use cafe_space_backend::store::Stores;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Cafe Space backend...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        host = %config.server_host,
        port = %config.server_port,
        storage = %config.storage_backend.as_str(),
        "Configuration loaded"
    );

    let (stores, redis_pool) = match config.storage_backend {
        StorageBackend::Redis => {
            let pool = create_pool(&config)?;

            // Test Redis connection
            match health_check(&pool).await {
                Ok(true) => tracing::info!("Redis connection established"),
                Ok(false) => tracing::warn!("Redis health check returned false"),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to connect to Redis");
                    // Continue anyway, might recover later
                }
            }

            (redis_stores(pool.clone(), &config), Some(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            (Stores::memory(), None)
        }
    };

    let addr: SocketAddr = config.server_addr().parse()?;
    let state = AppState::new(config, stores, redis_pool);
    let app = build_app(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Handle shutdown signals
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
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
