//! Configuration types for the ember engine and server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory containing model binary files
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Manifest file name, resolved inside `models_dir`
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Directory holding one JSON file per persona
    #[serde(default = "default_personas_dir")]
    pub personas_dir: PathBuf,

    /// Context window size (tokens)
    #[serde(default = "default_context_size")]
    pub context_size: u32,

    /// Number of threads for CPU inference
    #[serde(default = "default_num_threads")]
    pub n_threads: i32,

    /// Number of layers offloaded to the GPU (0 = CPU only)
    #[serde(default)]
    pub n_gpu_layers: u32,

    /// Run a manifest reconciliation pass during engine initialization
    #[serde(default = "default_reconcile_on_start")]
    pub reconcile_on_start: bool,
}

impl EngineConfig {
    /// Full path of the persisted model manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.models_dir.join(&self.manifest_file)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            manifest_file: default_manifest_file(),
            personas_dir: default_personas_dir(),
            context_size: default_context_size(),
            n_threads: default_num_threads(),
            n_gpu_layers: 0,
            reconcile_on_start: default_reconcile_on_start(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("EMBER_MODELS_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ember")
        .join("models")
}

fn default_manifest_file() -> String {
    "models.json".to_string()
}

fn default_personas_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("EMBER_PERSONAS_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ember")
        .join("personas")
}

fn default_context_size() -> u32 {
    2048
}

fn default_num_threads() -> i32 {
    get_num_cpus().min(8) as i32
}

fn default_reconcile_on_start() -> bool {
    true
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_cors_enabled(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_enabled() -> bool {
    true
}

fn get_num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}
