//! llama.cpp implementation of the backend seam.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

use encoding_rs::UTF_8;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;
use tracing::info;

use super::{Completion, CompletionRequest, LoadOptions, ModelHandle, StopScanner, TextBackend};
use crate::error::{Error, Result};

/// Owns the process-wide llama.cpp backend state.
pub struct LlamaCppBackend {
    runtime: Arc<LlamaRuntime>,
}

struct LlamaRuntime {
    backend: LlamaBackend,
}

impl LlamaCppBackend {
    pub fn new() -> Result<Self> {
        let backend = LlamaBackend::init().map_err(|e| Error::BackendInit(e.to_string()))?;
        Ok(Self {
            runtime: Arc::new(LlamaRuntime { backend }),
        })
    }
}

impl TextBackend for LlamaCppBackend {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Box<dyn ModelHandle>> {
        let params = LlamaModelParams::default().with_n_gpu_layers(options.n_gpu_layers);
        let model = LlamaModel::load_from_file(&self.runtime.backend, path, &params)
            .map_err(|e| Error::BackendInit(e.to_string()))?;
        info!("Loaded model weights from {}", path.display());

        Ok(Box::new(LlamaHandle {
            model,
            context_size: options.context_size,
            n_threads: options.n_threads,
            runtime: self.runtime.clone(),
        }))
    }
}

// `model` precedes `runtime` so the model's device buffers drop before the
// backend they were allocated from.
struct LlamaHandle {
    model: LlamaModel,
    context_size: u32,
    n_threads: i32,
    runtime: Arc<LlamaRuntime>,
}

impl LlamaHandle {
    /// Shared generation loop. Pieces that survive stop-sequence scanning
    /// are appended to the returned text and, when `emit` is present,
    /// forwarded as they are produced; `emit` returning false cancels.
    fn run(
        &self,
        request: &CompletionRequest,
        mut emit: Option<&mut dyn FnMut(String) -> bool>,
    ) -> Result<Completion> {
        let tokens = self
            .model
            .str_to_token(&request.prompt, AddBos::Always)
            .map_err(|e| Error::Inference(format!("Tokenization failed: {e}")))?;

        let prompt_tokens = tokens.len();
        let n_ctx = self.context_size as usize;
        if prompt_tokens >= n_ctx {
            return Err(Error::Inference(format!(
                "Prompt ({prompt_tokens} tokens) exceeds the context window ({n_ctx})"
            )));
        }

        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.context_size))
            .with_n_threads(self.n_threads)
            .with_n_threads_batch(self.n_threads);
        let mut ctx = self
            .model
            .new_context(&self.runtime.backend, ctx_params)
            .map_err(|e| Error::Inference(format!("Failed to create context: {e}")))?;

        let n_batch = ctx.n_batch() as usize;
        for chunk in tokens.chunks(n_batch) {
            let mut batch = LlamaBatch::get_one(chunk)
                .map_err(|e| Error::Inference(format!("Failed to create batch: {e}")))?;
            ctx.decode(&mut batch)
                .map_err(|e| Error::Inference(format!("Prefill decode failed: {e}")))?;
        }

        let mut sampler = build_sampler(request.temperature, request.top_p);
        let mut scanner = StopScanner::new(&request.stop);
        let mut decoder = UTF_8.new_decoder();
        let mut text = String::new();
        let mut completion_tokens = 0usize;
        let mut cancelled = false;
        let max_output = request.max_tokens.min(n_ctx - prompt_tokens);

        for _ in 0..max_output {
            let token = sampler.sample(&ctx, -1);
            sampler.accept(token);

            if self.model.is_eog_token(token) {
                break;
            }
            completion_tokens += 1;

            let piece = self
                .model
                .token_to_piece(token, &mut decoder, true, None)
                .map_err(|e| Error::Inference(format!("Failed to decode token: {e}")))?;

            if !piece.is_empty() {
                let (ready, stopped) = scanner.push(&piece);
                if !ready.is_empty() {
                    text.push_str(&ready);
                    if let Some(emit) = emit.as_mut() {
                        if !emit(ready) {
                            cancelled = true;
                            break;
                        }
                    }
                }
                if stopped {
                    break;
                }
            }

            let mut batch = LlamaBatch::get_one(&[token])
                .map_err(|e| Error::Inference(format!("Failed to create batch: {e}")))?;
            ctx.decode(&mut batch)
                .map_err(|e| Error::Inference(format!("Decode failed: {e}")))?;
        }

        if !cancelled {
            let tail = scanner.flush();
            if !tail.is_empty() {
                text.push_str(&tail);
                if let Some(emit) = emit.as_mut() {
                    emit(tail);
                }
            }
        }

        Ok(Completion {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}

impl ModelHandle for LlamaHandle {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.run(request, None)
    }

    fn complete_streaming(
        &self,
        request: &CompletionRequest,
        emit: &mut dyn FnMut(String) -> bool,
    ) -> Result<Completion> {
        self.run(request, Some(emit))
    }
}

fn build_sampler(temperature: f32, top_p: f32) -> LlamaSampler {
    if temperature <= 0.0 {
        return LlamaSampler::greedy();
    }
    LlamaSampler::chain_simple(vec![
        LlamaSampler::top_p(top_p, 1),
        LlamaSampler::temp(temperature),
        LlamaSampler::dist(0),
    ])
}
