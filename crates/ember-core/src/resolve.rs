//! Request resolution: persona overlay and model selection.
//!
//! Turns a raw chat request plus an optional persona selector into a fully
//! specified generation request, loading the target model when it differs
//! from the one in the slot. Reads the persona store, never mutates it.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::chat::{ChatMessage, ChatRole};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::persona::{Persona, PersonaStore};
use crate::stream::DeliveryMode;

pub const DEFAULT_MAX_TOKENS: usize = 512;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.9;

/// An incoming chat request, before resolution. Option fields distinguish
/// "caller supplied" from "caller left it to us".
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub delivery_mode: Option<DeliveryMode>,
}

/// A fully specified generation request. Built fresh per call.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
    pub delivery: DeliveryMode,
}

/// Overlay a persona onto a raw request. Caller-supplied values always win;
/// the system message is injected only when the request doesn't already
/// open with one, and a present-but-empty system message gets its content
/// filled in.
pub fn apply_persona(request: &mut ChatRequest, persona: &Persona) {
    if request.model.is_empty() && !persona.model.is_empty() {
        request.model = persona.model.clone();
    }
    if request.temperature.is_none() {
        request.temperature = Some(persona.temperature);
    }
    if request.max_tokens.is_none() {
        request.max_tokens = Some(persona.max_tokens);
    }
    if request.top_p.is_none() {
        request.top_p = Some(persona.top_p);
    }

    match request.messages.first_mut() {
        Some(first) if first.role == ChatRole::System => {
            if first.content.is_empty() {
                first.content = persona.system_message.clone();
            }
        }
        _ => request.messages.insert(
            0,
            ChatMessage::new(ChatRole::System, persona.system_message.clone()),
        ),
    }
}

pub struct RequestResolver {
    engine: Arc<Engine>,
    personas: Arc<PersonaStore>,
}

impl RequestResolver {
    pub fn new(engine: Arc<Engine>, personas: Arc<PersonaStore>) -> Self {
        Self { engine, personas }
    }

    /// Resolve a request. `persona_id` and `delivery_hint` come from
    /// side-channel signals (request headers), not the request body; an
    /// explicit body field still wins for delivery mode. A model that
    /// cannot be loaded is a request-level `ModelUnavailable` failure.
    pub async fn resolve(
        &self,
        mut request: ChatRequest,
        persona_id: Option<&str>,
        delivery_hint: Option<DeliveryMode>,
    ) -> Result<ResolvedRequest> {
        if let Some(id) = persona_id {
            match self.personas.get(id).await {
                Some(persona) => apply_persona(&mut request, &persona),
                None => warn!("Persona '{}' not found; resolving without overlay", id),
            }
        }

        let model = if request.model.is_empty() {
            self.engine.current_model().await.ok_or_else(|| {
                Error::ModelUnavailable("no model requested and none loaded".to_string())
            })?
        } else {
            request.model.clone()
        };

        if !self.engine.ensure_loaded(&model).await {
            return Err(Error::ModelUnavailable(model));
        }

        Ok(ResolvedRequest {
            model,
            messages: request.messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: request.top_p.unwrap_or(DEFAULT_TOP_P),
            stream: request.stream.unwrap_or(false),
            delivery: request
                .delivery_mode
                .or(delivery_hint)
                .unwrap_or_default(),
        })
    }
}
