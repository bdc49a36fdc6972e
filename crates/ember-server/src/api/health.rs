//! Service status endpoints.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;
use ember_core::HealthStatus;

#[derive(Serialize)]
pub struct RootResponse {
    status: &'static str,
    message: &'static str,
    engine_state: &'static str,
}

/// Basic status banner
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let ready = state.engine.health().await.ready;
    Json(RootResponse {
        status: "online",
        message: "Ember inference hub is running",
        engine_state: if ready { "ready" } else { "initializing" },
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    engine: HealthStatus,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        engine: state.engine.health().await,
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    current_model: Option<String>,
    health: HealthStatus,
    timestamp: u64,
}

/// Detailed system status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let health = state.engine.health().await;
    Json(StatusResponse {
        status: if health.ready { "ready" } else { "initializing" },
        current_model: health.current_model.clone(),
        health,
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    })
}
