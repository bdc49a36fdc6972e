//! API routes and handlers

mod chat;
mod health;
mod models;
mod personas;
mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // OpenAI-compatible chat surface
        .route("/chat/completions", post(chat::completions))
        // Model catalog & lifecycle
        .route("/models", get(models::list_models))
        .route("/models/reconcile", post(models::reconcile))
        .route("/models/{name}/load", post(models::load_model))
        // Persona management
        .route(
            "/personas",
            get(personas::list_personas).post(personas::create_persona),
        )
        .route("/personas/draft", post(personas::draft_system_message))
        .route(
            "/personas/{id}",
            get(personas::get_persona)
                .put(personas::update_persona)
                .delete(personas::delete_persona),
        )
        // Status
        .route("/status", get(health::status));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ws", get(ws::upgrade))
        .nest("/v1", v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
