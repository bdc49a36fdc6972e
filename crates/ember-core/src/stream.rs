//! Streaming delivery protocol.
//!
//! Converts the engine's lazy chunk sequence into an ordered event stream
//! that survives buffering intermediaries: an immediate start event forces
//! an early header flush, a single oversized padding event defeats
//! threshold-based buffering, and proxied delivery paces chunks so forward
//! progress stays observable. The stream always ends with a terminal
//! marker, even when the backend fails before producing a single token.

use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Pause between chunks under proxied delivery.
pub const PROXIED_CHUNK_PACING: Duration = Duration::from_millis(10);

/// Size of the filler payload emitted after the start event.
pub const PADDING_BYTES: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Assume buffering intermediaries between us and the client.
    #[default]
    Proxied,
    /// Trusted low-latency local caller; forward chunks as produced.
    Direct,
}

impl DeliveryMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proxied" => Some(Self::Proxied),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// One unit of the outbound token sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamChunk {
    pub delta: String,
    pub finish_reason: Option<String>,
    pub model: String,
}

/// Events of one streamed response, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Zero-content opener carrying the model name.
    Start { model: String },
    /// Oversized filler payload.
    Padding(String),
    Chunk(StreamChunk),
    /// Terminal failure notice; always followed by `Done`.
    Error { kind: String, message: String },
    /// End-of-stream marker, distinct from any chunk.
    Done,
}

/// Drive one streamed response. `rx` is the engine's chunk sequence; an
/// `Err` item replaces all further chunks with a single error event. The
/// returned stream is single-pass and finite.
pub fn deliver(
    mut rx: mpsc::Receiver<Result<StreamChunk>>,
    model: String,
    mode: DeliveryMode,
) -> impl Stream<Item = StreamEvent> {
    stream! {
        yield StreamEvent::Start { model: model.clone() };
        yield StreamEvent::Padding(" ".repeat(PADDING_BYTES));

        while let Some(item) = rx.recv().await {
            match item {
                Ok(chunk) => {
                    yield StreamEvent::Chunk(chunk);
                    if mode == DeliveryMode::Proxied {
                        tokio::time::sleep(PROXIED_CHUNK_PACING).await;
                    }
                }
                Err(err) => {
                    yield StreamEvent::Error {
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    };
                    yield StreamEvent::Done;
                    return;
                }
            }
        }

        yield StreamEvent::Chunk(StreamChunk {
            delta: String::new(),
            finish_reason: Some("stop".to_string()),
            model,
        });
        yield StreamEvent::Done;
    }
}
