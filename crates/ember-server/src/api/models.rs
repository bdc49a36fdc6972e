//! Model catalog and lifecycle endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ModelsResponse {
    object: &'static str,
    data: Vec<ModelEntry>,
}

#[derive(Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    owned_by: &'static str,
    description: String,
    tags: Vec<String>,
    loaded: bool,
}

/// List available models (OpenAI-compatible shape with catalog metadata)
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state
        .engine
        .available_models()
        .await
        .into_iter()
        .map(|model| ModelEntry {
            id: model.id,
            object: "model",
            owned_by: "ember",
            description: model.description,
            tags: model.tags,
            loaded: model.loaded,
        })
        .collect();

    Json(ModelsResponse {
        object: "list",
        data,
    })
}

#[derive(Serialize)]
pub struct LoadResponse {
    status: &'static str,
    message: String,
    current_model: Option<String>,
}

/// Load a specific model into the slot
pub async fn load_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<LoadResponse>, ApiError> {
    info!("Load requested for model: {}", name);

    if !state.engine.load_model(&name).await {
        return Err(ApiError::bad_request(format!(
            "Failed to load model '{name}'"
        )));
    }

    Ok(Json(LoadResponse {
        status: "success",
        message: format!("Model '{name}' loaded successfully"),
        current_model: state.engine.current_model().await,
    }))
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    status: &'static str,
    models: usize,
}

/// Reconcile the manifest against the models directory, then refresh the
/// engine catalog.
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileResponse>, ApiError> {
    let config = state.engine.config();
    let dir = config.models_dir.clone();
    let manifest = config.manifest_path();

    let ok = tokio::task::spawn_blocking(move || ember_core::reconcile(&dir, &manifest, true))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if !ok {
        return Err(ApiError::internal("Manifest reconciliation failed"));
    }

    let models = state.engine.refresh_catalog().await?;
    Ok(Json(ReconcileResponse {
        status: "reconciled",
        models,
    }))
}
