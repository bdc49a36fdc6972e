//! Persona CRUD endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use ember_core::{ChatMessage, ChatRole, Persona, ResolvedRequest};

pub async fn list_personas(State(state): State<AppState>) -> Json<Vec<Persona>> {
    Json(state.personas.list().await)
}

pub async fn get_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Persona>, ApiError> {
    state
        .personas
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Persona not found: {id}")))
}

pub async fn create_persona(
    State(state): State<AppState>,
    Json(persona): Json<Persona>,
) -> Result<Json<Persona>, ApiError> {
    state
        .personas
        .save(persona)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::bad_request("Persona validation failed"))
}

pub async fn update_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut persona): Json<Persona>,
) -> Result<Json<Persona>, ApiError> {
    if state.personas.get(&id).await.is_none() {
        return Err(ApiError::not_found(format!("Persona not found: {id}")));
    }
    persona.id = id;
    state
        .personas
        .save(persona)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::bad_request("Persona validation failed"))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    status: &'static str,
    id: String,
}

pub async fn delete_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !state.personas.delete(&id).await {
        return Err(ApiError::not_found(format!("Persona not found: {id}")));
    }
    Ok(Json(DeleteResponse {
        status: "deleted",
        id,
    }))
}

#[derive(Deserialize)]
pub struct DraftRequest {
    pub description: String,
}

#[derive(Serialize)]
pub struct DraftResponse {
    pub system_message: String,
}

/// Draft a persona system message from a short description, using the
/// loaded local model.
pub async fn draft_system_message(
    State(state): State<AppState>,
    Json(request): Json<DraftRequest>,
) -> Result<Json<DraftResponse>, ApiError> {
    if request.description.trim().is_empty() {
        return Err(ApiError::bad_request("Description must not be empty"));
    }

    let model = state
        .engine
        .current_model()
        .await
        .ok_or_else(|| ApiError::unavailable("No model loaded"))?;

    let resolved = ResolvedRequest {
        model,
        messages: vec![
            ChatMessage::new(
                ChatRole::System,
                "You write first-person identity prompts for AI personas. \
                 Given a description, answer with the persona's system message \
                 only: who they are, what they believe, and how they respond. \
                 Keep it under two hundred words.",
            ),
            ChatMessage::new(ChatRole::User, request.description),
        ],
        max_tokens: 800,
        temperature: 0.8,
        top_p: 0.9,
        stream: false,
        delivery: Default::default(),
    };

    let generation = state.engine.generate(&resolved).await?;
    Ok(Json(DraftResponse {
        system_message: generation.content,
    }))
}
