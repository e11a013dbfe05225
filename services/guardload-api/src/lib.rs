pub mod handlers;
pub mod rest;
pub mod state;
pub mod telemetry;

pub use rest::{build_router, API_PREFIX};
pub use state::AppState;

use guardload_core::{CoreError, CoreResult};
use guardload_service::{Config, HttpRequestIssuer, LoadRunner};
use guardload_storage::{HistoryStore, LocalHistoryStore, MemoryHistoryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Boots the load-test API server and runs it until a shutdown signal.
///
/// An active test is stopped and persisted before this returns.
pub async fn run_server(config: Config) -> CoreResult<()> {
    let issuer = Arc::new(HttpRequestIssuer::from_config(&config.target)?);
    info!("Guardrail target: {}", issuer.url());

    let store: Arc<dyn HistoryStore> = match config.runner.history_backend.as_str() {
        "memory" => {
            info!("Using in-memory history store (records are lost on restart)");
            Arc::new(MemoryHistoryStore::new())
        }
        _ => {
            info!("Using local history store at {:?}", config.runner.history_dir);
            Arc::new(LocalHistoryStore::new(&config.runner.history_dir).await?)
        }
    };

    let runner = Arc::new(LoadRunner::new(issuer, store, config.runner.settings()));
    let app = build_router(AppState::new(Arc::clone(&runner)));

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        CoreError::validation(format!("Invalid bind address '{}': {}", bind_address, e))
    })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| CoreError::internal(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("Load-test API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CoreError::internal(format!("Server error: {}", e)))?;

    runner
        .shutdown(Duration::from_secs(config.server.shutdown_timeout_seconds))
        .await;

    info!("Load-test API shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, initiating graceful shutdown");
        }
    }
}
