//! Single-slot model lifecycle management and generation.
//!
//! The engine holds at most one loaded model handle. Loads are serialized
//! by a mutex, and generation holds a single-flight semaphore permit, so a
//! load can never interleave with slot mutation and two generations never
//! run at once. A generation in flight clones the handle `Arc`; a load that
//! swaps the slot mid-stream releases the old handle from the slot
//! immediately, and its memory is freed when the stream finishes.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tracing::{info, warn};

use crate::backend::{CompletionRequest, LoadOptions, ModelHandle, TextBackend};
use crate::chat::{format_prompt, STOP_MARKERS};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::manifest::{load_manifest, ModelDescriptor};
use crate::resolve::ResolvedRequest;
use crate::stream::StreamChunk;

/// Token accounting for one completion. Zero-filled when the backend does
/// not report counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A finished non-streaming completion.
#[derive(Debug, Clone)]
pub struct ChatGeneration {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

/// Point-in-time engine health. Pure read, no side effects.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub model_loaded: bool,
    pub current_model: Option<String>,
    pub available_models: usize,
    pub ready: bool,
}

/// Catalog entry enriched with the slot state, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ModelListing {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub loaded: bool,
}

#[derive(Default)]
struct Slot {
    handle: Option<Arc<dyn ModelHandle>>,
    current: Option<String>,
    ready: bool,
}

pub struct Engine {
    config: EngineConfig,
    backend: Arc<dyn TextBackend>,
    catalog: RwLock<Vec<ModelDescriptor>>,
    slot: RwLock<Slot>,
    load_lock: Mutex<()>,
    generation: Arc<Semaphore>,
}

impl Engine {
    pub fn new(config: EngineConfig, backend: Arc<dyn TextBackend>) -> Self {
        Self {
            config,
            backend,
            catalog: RwLock::new(Vec::new()),
            slot: RwLock::new(Slot::default()),
            load_lock: Mutex::new(()),
            generation: Arc::new(Semaphore::new(1)),
        }
    }

    /// Engine wired to the llama.cpp backend.
    #[cfg(feature = "llama")]
    pub fn with_default_backend(config: EngineConfig) -> Result<Self> {
        let backend = crate::backend::llama::LlamaCppBackend::new()?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconcile the manifest (when configured), populate the catalog, and
    /// load the first cataloged model as the startup default.
    pub async fn initialize(&self) -> Result<()> {
        if self.config.reconcile_on_start {
            let dir = self.config.models_dir.clone();
            let manifest = self.config.manifest_path();
            let ok = tokio::task::spawn_blocking(move || {
                crate::manifest::reconcile(&dir, &manifest, true)
            })
            .await
            .unwrap_or(false);
            if !ok {
                warn!("Startup reconciliation failed; using the existing manifest as-is");
            }
        }

        self.refresh_catalog().await?;

        let first = self.catalog.read().await.first().map(|d| d.name.clone());
        match first {
            Some(name) => {
                if !self.load_model(&name).await {
                    warn!("Default model '{}' failed to load at startup", name);
                }
            }
            None => warn!("Catalog is empty; no model loaded at startup"),
        }

        Ok(())
    }

    /// Re-read the manifest into the catalog. Returns the catalog size.
    pub async fn refresh_catalog(&self) -> Result<usize> {
        let descriptors = load_manifest(&self.config.manifest_path())?;
        info!("Catalog refreshed: {} models", descriptors.len());
        let mut catalog = self.catalog.write().await;
        *catalog = descriptors;
        Ok(catalog.len())
    }

    /// Load a model by catalog name, replacing whatever the slot held.
    /// Failures (unknown name, missing file, backend construction error)
    /// are logged and reported as false, leaving the slot unchanged.
    pub async fn load_model(&self, name: &str) -> bool {
        match self.try_load(name).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to load model '{}': {}", name, err);
                false
            }
        }
    }

    async fn try_load(&self, name: &str) -> Result<()> {
        let _serialized = self.load_lock.lock().await;

        let descriptor = self
            .catalog
            .read()
            .await
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))?;

        let path = self.config.models_dir.join(&descriptor.file);
        if !path.is_file() {
            return Err(Error::ModelFileMissing(path));
        }

        // Release the previous handle before constructing the new one: the
        // slot never holds two handles.
        {
            let mut slot = self.slot.write().await;
            slot.handle = None;
            slot.current = None;
            slot.ready = false;
        }

        info!("Loading model '{}' from {}", name, path.display());
        let options = LoadOptions {
            context_size: self.config.context_size,
            n_threads: self.config.n_threads,
            n_gpu_layers: self.config.n_gpu_layers,
        };
        let backend = self.backend.clone();
        let handle = tokio::task::spawn_blocking(move || backend.load(&path, &options))
            .await
            .map_err(|e| Error::BackendInit(e.to_string()))??;

        let mut slot = self.slot.write().await;
        slot.handle = Some(Arc::from(handle));
        slot.current = Some(name.to_string());
        slot.ready = true;
        info!("Model '{}' ready", name);
        Ok(())
    }

    /// No-op when `name` is already the loaded model, otherwise load it.
    pub async fn ensure_loaded(&self, name: &str) -> bool {
        if self.slot.read().await.current.as_deref() == Some(name) {
            return true;
        }
        self.load_model(name).await
    }

    /// Release the held handle and clear readiness. Idempotent.
    pub async fn unload(&self) {
        let mut slot = self.slot.write().await;
        if let Some(name) = slot.current.take() {
            info!("Unloaded model '{}'", name);
        }
        slot.handle = None;
        slot.ready = false;
    }

    pub async fn current_model(&self) -> Option<String> {
        self.slot.read().await.current.clone()
    }

    pub async fn health(&self) -> HealthStatus {
        let (model_loaded, current_model, ready) = {
            let slot = self.slot.read().await;
            (slot.handle.is_some(), slot.current.clone(), slot.ready)
        };
        HealthStatus {
            model_loaded,
            current_model,
            available_models: self.catalog.read().await.len(),
            ready,
        }
    }

    /// Catalog listing with a `loaded` flag per entry.
    pub async fn available_models(&self) -> Vec<ModelListing> {
        let current = self.current_model().await;
        self.catalog
            .read()
            .await
            .iter()
            .map(|d| ModelListing {
                id: d.name.clone(),
                name: d.name.clone(),
                description: d.description.clone(),
                tags: d.tags.clone(),
                loaded: current.as_deref() == Some(d.name.as_str()),
            })
            .collect()
    }

    /// Blocking completion. Fails with `NotReady` when no model is loaded.
    pub async fn generate(&self, request: &ResolvedRequest) -> Result<ChatGeneration> {
        let (handle, model) = self.current_handle().await?;
        let permit = self
            .generation
            .clone()
            .acquire_owned()
            .await
            .expect("generation semaphore closed");

        let completion_request = completion_request(request);
        let completion = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            handle.complete(&completion_request)
        })
        .await
        .map_err(|e| Error::Inference(e.to_string()))??;

        Ok(ChatGeneration {
            content: completion.text.trim().to_string(),
            model,
            usage: Usage {
                prompt_tokens: completion.prompt_tokens,
                completion_tokens: completion.completion_tokens,
                total_tokens: completion.prompt_tokens + completion.completion_tokens,
            },
        })
    }

    /// Streaming completion: a lazy, single-pass, finite chunk sequence.
    /// Empty fragments are filtered at the source; dropping the receiver
    /// stops the producer. A backend failure arrives as the final `Err`.
    pub async fn generate_streaming(
        &self,
        request: &ResolvedRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk>>> {
        let (handle, model) = self.current_handle().await?;
        let permit = self
            .generation
            .clone()
            .acquire_owned()
            .await
            .expect("generation semaphore closed");

        let completion_request = completion_request(request);
        let (tx, rx) = mpsc::channel::<Result<StreamChunk>>(32);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let chunk_tx = tx.clone();
            let chunk_model = model;
            let mut emit = move |delta: String| {
                if delta.is_empty() {
                    return true;
                }
                chunk_tx
                    .blocking_send(Ok(StreamChunk {
                        delta,
                        finish_reason: None,
                        model: chunk_model.clone(),
                    }))
                    .is_ok()
            };
            if let Err(err) = handle.complete_streaming(&completion_request, &mut emit) {
                let _ = tx.blocking_send(Err(err));
            }
        });

        Ok(rx)
    }

    async fn current_handle(&self) -> Result<(Arc<dyn ModelHandle>, String)> {
        let slot = self.slot.read().await;
        match (&slot.handle, &slot.current) {
            (Some(handle), Some(name)) if slot.ready => Ok((handle.clone(), name.clone())),
            _ => Err(Error::NotReady),
        }
    }
}

fn completion_request(request: &ResolvedRequest) -> CompletionRequest {
    CompletionRequest {
        prompt: format_prompt(&request.messages),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: STOP_MARKERS.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::chat::{ChatMessage, ChatRole};
    use crate::manifest::save_manifest;
    use crate::stream::DeliveryMode;
    use std::sync::atomic::Ordering;

    fn resolved(model: &str) -> ResolvedRequest {
        ResolvedRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::new(ChatRole::User, "hi")],
            max_tokens: 64,
            temperature: 0.7,
            top_p: 0.9,
            stream: false,
            delivery: DeliveryMode::Proxied,
        }
    }

    async fn test_engine(backend: FakeBackend) -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let models_dir = dir.path().join("models");
        std::fs::create_dir_all(&models_dir).unwrap();
        std::fs::write(models_dir.join("alpha.gguf"), b"weights").unwrap();
        std::fs::write(models_dir.join("beta.gguf"), b"weights").unwrap();

        let descriptor = |name: &str, file: &str| ModelDescriptor {
            name: name.to_string(),
            file: file.to_string(),
            description: "test model".to_string(),
            tags: vec!["local".to_string()],
        };
        let descriptors = vec![
            descriptor("alpha", "alpha.gguf"),
            descriptor("beta", "beta.gguf"),
            descriptor("ghost", "ghost.gguf"),
        ];
        save_manifest(&models_dir.join("models.json"), &descriptors).unwrap();

        let config = EngineConfig {
            models_dir,
            manifest_file: "models.json".to_string(),
            personas_dir: dir.path().join("personas"),
            context_size: 2048,
            n_threads: 2,
            n_gpu_layers: 0,
            reconcile_on_start: false,
        };
        let engine = Engine::new(config, Arc::new(backend));
        engine.refresh_catalog().await.unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn unknown_model_leaves_state_unchanged() {
        let (engine, _dir) = test_engine(FakeBackend::scripted(&["hi"])).await;

        assert!(!engine.load_model("nonexistent").await);

        let health = engine.health().await;
        assert!(!health.model_loaded);
        assert!(health.current_model.is_none());
        assert!(!health.ready);
    }

    #[tokio::test]
    async fn missing_file_fails_load() {
        let (engine, _dir) = test_engine(FakeBackend::scripted(&["hi"])).await;
        assert!(!engine.load_model("ghost").await);
        assert!(!engine.health().await.ready);
    }

    #[tokio::test]
    async fn construction_failure_fails_load() {
        let backend = FakeBackend {
            fail_construct: true,
            ..FakeBackend::default()
        };
        let (engine, _dir) = test_engine(backend).await;
        assert!(!engine.load_model("alpha").await);
        assert!(!engine.health().await.ready);
    }

    #[tokio::test]
    async fn swapping_models_holds_one_handle_at_a_time() {
        let backend = FakeBackend::scripted(&["hi"]);
        let live = backend.live_handles.clone();
        let live_at_construct = backend.live_at_construct.clone();
        let (engine, _dir) = test_engine(backend).await;

        assert!(engine.load_model("alpha").await);
        assert!(engine.load_model("beta").await);

        assert_eq!(live.load(Ordering::SeqCst), 1);
        // The previous handle was released before either construction ran.
        assert_eq!(live_at_construct.load(Ordering::SeqCst), 0);
        assert_eq!(engine.current_model().await.as_deref(), Some("beta"));
        assert!(engine.health().await.ready);
    }

    #[tokio::test]
    async fn ensure_loaded_skips_reload_of_current_model() {
        let backend = FakeBackend::scripted(&["hi"]);
        let constructions = backend.constructions.clone();
        let (engine, _dir) = test_engine(backend).await;

        assert!(engine.ensure_loaded("alpha").await);
        assert!(engine.ensure_loaded("alpha").await);
        // Only one construction happened; the second call was a no-op.
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unload_is_idempotent() {
        let (engine, _dir) = test_engine(FakeBackend::scripted(&["hi"])).await;
        assert!(engine.load_model("alpha").await);

        engine.unload().await;
        engine.unload().await;

        let health = engine.health().await;
        assert!(!health.model_loaded);
        assert!(!health.ready);
    }

    #[tokio::test]
    async fn generate_without_model_is_not_ready() {
        let (engine, _dir) = test_engine(FakeBackend::scripted(&["hi"])).await;
        let err = engine.generate(&resolved("alpha")).await.unwrap_err();
        assert!(matches!(err, Error::NotReady));
    }

    #[tokio::test]
    async fn generate_returns_trimmed_text_and_usage() {
        let (engine, _dir) = test_engine(FakeBackend::scripted(&[" The answer is 4. "])).await;
        assert!(engine.load_model("alpha").await);

        let generation = engine.generate(&resolved("alpha")).await.unwrap();
        assert_eq!(generation.content, "The answer is 4.");
        assert_eq!(generation.model, "alpha");
        assert_eq!(generation.usage.total_tokens, 8);
    }

    #[tokio::test]
    async fn streaming_filters_empty_fragments() {
        let (engine, _dir) = test_engine(FakeBackend::scripted(&["Hel", "", "lo", ""])).await;
        assert!(engine.load_model("alpha").await);

        let mut rx = engine.generate_streaming(&resolved("alpha")).await.unwrap();
        let mut deltas = Vec::new();
        while let Some(item) = rx.recv().await {
            deltas.push(item.unwrap().delta);
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn streaming_failure_arrives_as_final_error() {
        let backend = FakeBackend {
            script: vec!["ok".to_string()],
            fail_after: Some(1),
            ..FakeBackend::default()
        };
        let (engine, _dir) = test_engine(backend).await;
        assert!(engine.load_model("alpha").await);

        let mut rx = engine.generate_streaming(&resolved("alpha")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().delta, "ok");
        assert!(matches!(rx.recv().await.unwrap(), Err(Error::Inference(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn available_models_flags_loaded_entry() {
        let (engine, _dir) = test_engine(FakeBackend::scripted(&["hi"])).await;
        assert!(engine.load_model("beta").await);

        let listing = engine.available_models().await;
        assert_eq!(listing.len(), 3);
        let beta = listing.iter().find(|m| m.id == "beta").unwrap();
        assert!(beta.loaded);
        let alpha = listing.iter().find(|m| m.id == "alpha").unwrap();
        assert!(!alpha.loaded);
    }
}
