//! Error types for the ember core.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Model not found in catalog: {0}")]
    ModelNotFound(String),

    #[error("Model file missing: {}", .0.display())]
    ModelFileMissing(PathBuf),

    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    #[error("No model loaded")]
    NotReady,

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Persona not found: {0}")]
    PersonaNotFound(String),

    #[error("Persona validation failed: {0}")]
    PersonaValidation(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable tag, used by stream error events and the
    /// HTTP error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ModelNotFound(_) => "model_not_found",
            Error::ModelFileMissing(_) => "model_file_missing",
            Error::BackendInit(_) => "backend_init_failure",
            Error::NotReady => "not_ready",
            Error::ModelUnavailable(_) => "model_unavailable",
            Error::PersonaNotFound(_) => "persona_not_found",
            Error::PersonaValidation(_) => "persona_validation",
            Error::Inference(_) => "inference_failure",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
        }
    }
}
