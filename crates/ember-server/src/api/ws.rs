//! WebSocket direct bridge: a thin duplicate client of the engine for
//! trusted local callers. Tokens are forwarded as soon as they are
//! produced, with no padding or pacing.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::state::AppState;
use ember_core::{ChatMessage, ChatRequest, DeliveryMode};

#[derive(Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum BridgeCommand {
    LoadModel {
        model: String,
    },
    Generate {
        #[serde(default)]
        messages: Vec<ChatMessage>,
        #[serde(default)]
        max_tokens: Option<usize>,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        persona: Option<String>,
    },
    Status,
}

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_client(socket, state))
}

async fn handle_client(mut socket: WebSocket, state: AppState) {
    debug!("Bridge client connected");

    while let Some(message) = socket.recv().await {
        let Ok(message) = message else { break };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let command = match serde_json::from_str::<BridgeCommand>(text.as_str()) {
            Ok(command) => command,
            Err(err) => {
                let event = json!({
                    "event": "error",
                    "message": format!("Unrecognized command: {err}"),
                });
                if send_json(&mut socket, &event).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let delivered = match command {
            BridgeCommand::LoadModel { model } => handle_load(&mut socket, &state, model).await,
            BridgeCommand::Generate {
                messages,
                max_tokens,
                temperature,
                persona,
            } => handle_generate(&mut socket, &state, messages, max_tokens, temperature, persona)
                .await,
            BridgeCommand::Status => handle_status(&mut socket, &state).await,
        };

        // A failed send means the client went away; dropping the stream
        // receiver cancels any generation in flight.
        if delivered.is_err() {
            break;
        }
    }

    debug!("Bridge client disconnected");
}

async fn handle_load(
    socket: &mut WebSocket,
    state: &AppState,
    model: String,
) -> Result<(), axum::Error> {
    let success = state.engine.load_model(&model).await;
    send_json(
        socket,
        &json!({
            "event": "model_loaded",
            "success": success,
            "model": if success { Some(model) } else { None },
        }),
    )
    .await
}

async fn handle_generate(
    socket: &mut WebSocket,
    state: &AppState,
    messages: Vec<ChatMessage>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    persona: Option<String>,
) -> Result<(), axum::Error> {
    let request = ChatRequest {
        model: String::new(),
        messages,
        max_tokens,
        temperature,
        top_p: None,
        stream: Some(true),
        delivery_mode: Some(DeliveryMode::Direct),
    };

    let resolved = match state
        .resolver
        .resolve(request, persona.as_deref(), Some(DeliveryMode::Direct))
        .await
    {
        Ok(resolved) => resolved,
        Err(err) => {
            return send_json(
                socket,
                &json!({"event": "error", "message": err.to_string()}),
            )
            .await;
        }
    };

    let mut rx = match state.engine.generate_streaming(&resolved).await {
        Ok(rx) => rx,
        Err(err) => {
            return send_json(
                socket,
                &json!({"event": "error", "message": err.to_string()}),
            )
            .await;
        }
    };

    send_json(
        socket,
        &json!({"event": "generation_start", "model": resolved.model}),
    )
    .await?;

    let mut text_so_far = String::new();
    while let Some(item) = rx.recv().await {
        match item {
            Ok(chunk) => {
                text_so_far.push_str(&chunk.delta);
                send_json(
                    socket,
                    &json!({
                        "event": "token",
                        "token": chunk.delta,
                        "text_so_far": text_so_far,
                    }),
                )
                .await?;
            }
            Err(err) => {
                return send_json(
                    socket,
                    &json!({"event": "error", "message": err.to_string()}),
                )
                .await;
            }
        }
    }

    send_json(
        socket,
        &json!({"event": "generation_complete", "text": text_so_far}),
    )
    .await
}

async fn handle_status(socket: &mut WebSocket, state: &AppState) -> Result<(), axum::Error> {
    let health = state.engine.health().await;
    send_json(
        socket,
        &json!({
            "event": "status",
            "is_ready": health.ready,
            "model": health.current_model,
        }),
    )
    .await
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}
