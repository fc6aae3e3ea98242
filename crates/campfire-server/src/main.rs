mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use campfire_api::auth::{AppState, AppStateInner};
use campfire_api::routes;
use campfire_db::Database;
use campfire_gateway::dispatcher::Dispatcher;
use campfire_storage::Storage;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campfire=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database and object storage
    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = Arc::new(Storage::new(config.storage_dir.clone(), &config.public_url).await?);

    // Background orphan sweep
    tokio::spawn(cleanup::run_cleanup_loop(
        db.clone(),
        storage.clone(),
        config.cleanup_interval_secs,
    ));

    let state: AppState = Arc::new(AppStateInner {
        db,
        storage,
        dispatcher: Dispatcher::new(),
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Campfire server listening on {}", addr);
    info!("Public URL: {}", config.public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("No SIGTERM handler ({}), waiting for Ctrl+C only", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
