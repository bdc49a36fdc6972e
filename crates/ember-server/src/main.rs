//! Ember Server - HTTP/WebSocket API for local LLM inference

use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use ember_core::{Engine, EngineConfig, PersonaStore, ServerConfig};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember_server=debug,ember_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ember inference hub");

    let engine_config = EngineConfig::default();
    info!("Models directory: {:?}", engine_config.models_dir);

    let personas = Arc::new(PersonaStore::new(engine_config.personas_dir.clone()));
    personas.load().await?;

    let engine = Arc::new(Engine::with_default_backend(engine_config)?);
    if let Err(err) = engine.initialize().await {
        warn!("Engine initialization incomplete: {}", err);
    }
    let state = AppState::new(engine, personas);

    info!("Engine initialized");

    let app = api::create_router(state.clone());

    let server_config = ServerConfig::default();
    let host = std::env::var("EMBER_HOST").unwrap_or(server_config.host);
    let port = match std::env::var("EMBER_PORT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    "Invalid EMBER_PORT='{}', falling back to {}",
                    raw, server_config.port
                );
                server_config.port
            }
        },
        Err(_) => server_config.port,
    };
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let shutdown_state = state.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_state));

    info!("Server ready. Press Ctrl+C to stop.");
    server.await?;

    Ok(())
}

/// Wait for shutdown signal and release the model slot
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
    state.engine.unload().await;
}
