//! OpenAI-compatible chat completions endpoint.

use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::State,
    http::HeaderMap,
    response::{sse::Event, sse::KeepAlive, IntoResponse, Response, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;
use ember_core::{deliver, ChatGeneration, ChatRequest, DeliveryMode, StreamEvent, Usage};

/// Header selecting a persona overlay for this request.
const PERSONA_HEADER: &str = "x-persona-id";
/// Header selecting the streaming delivery mode; the body field wins.
const DELIVERY_HEADER: &str = "x-delivery-mode";

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: usize,
    message: AssistantMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct AssistantMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatChunk {
    id: String,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
struct ChunkChoice {
    index: usize,
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

pub(crate) fn delivery_hint(headers: &HeaderMap) -> Option<DeliveryMode> {
    header_value(headers, DELIVERY_HEADER).and_then(|raw| DeliveryMode::parse(&raw))
}

pub async fn completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError::bad_request(
            "Chat request must include at least one message",
        ));
    }

    let persona_id = header_value(&headers, PERSONA_HEADER);
    let resolved = state
        .resolver
        .resolve(request, persona_id.as_deref(), delivery_hint(&headers))
        .await?;

    if resolved.stream {
        let rx = state.engine.generate_streaming(&resolved).await?;
        let events = deliver(rx, resolved.model.clone(), resolved.delivery);
        return Ok(sse_response(events).into_response());
    }

    let generation = state.engine.generate(&resolved).await?;
    Ok(Json(completion_response(generation)).into_response())
}

fn completion_response(generation: ChatGeneration) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: completion_id(),
        object: "chat.completion",
        created: now_unix_secs(),
        model: generation.model,
        choices: vec![Choice {
            index: 0,
            message: AssistantMessage {
                role: "assistant",
                content: generation.content,
            },
            finish_reason: "stop",
        }],
        usage: generation.usage,
    }
}

/// Map delivery events onto SSE frames. The start event becomes the
/// role-bearing opening chunk, padding becomes a comment frame (invisible
/// to OpenAI clients but large enough to flush intermediary buffers), and
/// the terminal marker becomes `data: [DONE]`.
fn sse_response(
    events: impl Stream<Item = StreamEvent> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = completion_id();
    let created = now_unix_secs();

    let frames = async_stream::stream! {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Start { model } => {
                    let chunk = ChatChunk {
                        id: id.clone(),
                        object: "chat.completion.chunk",
                        created,
                        model,
                        choices: vec![ChunkChoice {
                            index: 0,
                            delta: Delta {
                                role: Some("assistant"),
                                content: None,
                            },
                            finish_reason: None,
                        }],
                    };
                    yield Ok(Event::default()
                        .data(serde_json::to_string(&chunk).unwrap_or_default()));
                }
                StreamEvent::Padding(filler) => {
                    yield Ok(Event::default().comment(filler));
                }
                StreamEvent::Chunk(chunk) => {
                    let frame = ChatChunk {
                        id: id.clone(),
                        object: "chat.completion.chunk",
                        created,
                        model: chunk.model,
                        choices: vec![ChunkChoice {
                            index: 0,
                            delta: Delta {
                                role: None,
                                content: if chunk.delta.is_empty() {
                                    None
                                } else {
                                    Some(chunk.delta)
                                },
                            },
                            finish_reason: chunk.finish_reason,
                        }],
                    };
                    yield Ok(Event::default()
                        .data(serde_json::to_string(&frame).unwrap_or_default()));
                }
                StreamEvent::Error { kind, message } => {
                    let body = serde_json::json!({
                        "error": {
                            "message": message,
                            "type": kind,
                        }
                    });
                    yield Ok(Event::default().data(body.to_string()));
                }
                StreamEvent::Done => {
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
            }
        }
    };

    Sse::new(frames).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_hint_reads_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(delivery_hint(&headers), None);

        headers.insert(DELIVERY_HEADER, "direct".parse().unwrap());
        assert_eq!(delivery_hint(&headers), Some(DeliveryMode::Direct));

        headers.insert(DELIVERY_HEADER, "bogus".parse().unwrap());
        assert_eq!(delivery_hint(&headers), None);
    }

    #[test]
    fn chunk_delta_omits_absent_fields() {
        let chunk = ChatChunk {
            id: "chatcmpl-test".to_string(),
            object: "chat.completion.chunk",
            created: 0,
            model: "tinymodel".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content: Some("hi".to_string()),
                },
                finish_reason: None,
            }],
        };

        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""content":"hi""#));
        assert!(!json.contains("role"));
    }
}
