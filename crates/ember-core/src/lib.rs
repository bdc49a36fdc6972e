//! Ember Core - Local LLM Inference Orchestration
//!
//! This crate is the core of the ember hub: a single-slot model lifecycle
//! manager with a persona overlay on top of an OpenAI-style chat surface.
//!
//! # Architecture
//!
//! - A manifest reconciler discovers model files on disk and keeps the
//!   persisted catalog in sync.
//! - The engine owns at most one loaded model handle at a time and routes
//!   all generation through it.
//! - Personas are reusable system-prompt and sampling presets, persisted one
//!   file per persona and overlaid on incoming requests.
//! - Stream delivery turns the backend's token sequence into an ordered
//!   event protocol hardened against buffering intermediaries.
//!
//! # Example
//!
//! ```ignore
//! use ember_core::{Engine, EngineConfig};
//!
//! let engine = Engine::with_default_backend(EngineConfig::default())?;
//! engine.initialize().await?;
//! ```

pub mod backend;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod persona;
pub mod resolve;
pub mod stream;

pub use chat::{format_prompt, ChatMessage, ChatRole};
pub use config::{EngineConfig, ServerConfig};
pub use engine::{ChatGeneration, Engine, HealthStatus, ModelListing, Usage};
pub use error::{Error, Result};
pub use manifest::{reconcile, ModelDescriptor};
pub use persona::{default_personas, Persona, PersonaStore};
pub use resolve::{ChatRequest, RequestResolver, ResolvedRequest};
pub use stream::{deliver, DeliveryMode, StreamChunk, StreamEvent};
