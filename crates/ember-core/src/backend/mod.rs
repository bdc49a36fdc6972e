//! Inference backend seam.
//!
//! The engine only ever talks to the backend through [`TextBackend`] and
//! [`ModelHandle`], so the token-generation implementation can be swapped
//! (llama.cpp in production, a scripted fake in tests).

#[cfg(feature = "llama")]
pub mod llama;

use std::path::Path;

use crate::error::Result;

/// Knobs passed to backend construction.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub context_size: u32,
    pub n_threads: i32,
    pub n_gpu_layers: u32,
}

/// A fully specified completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// Result of a completion, streaming or not. Token counters are zero when
/// the backend cannot report them.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A loaded model. Calls are blocking; the engine runs them on a blocking
/// thread.
pub trait ModelHandle: Send + Sync {
    /// Run to completion and return the full text.
    fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Stream pieces through `emit` as they are produced. `emit` returning
    /// false cancels generation; the handle must stop pulling tokens and
    /// return what it has.
    fn complete_streaming(
        &self,
        request: &CompletionRequest,
        emit: &mut dyn FnMut(String) -> bool,
    ) -> Result<Completion>;
}

/// Constructs model handles from files on disk.
pub trait TextBackend: Send + Sync {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<Box<dyn ModelHandle>>;
}

/// Incremental stop-sequence detection over a stream of text pieces.
///
/// A stop marker can straddle piece boundaries, so the scanner holds back a
/// tail of `longest_stop - 1` characters until more text arrives. Text
/// before a detected marker is emitted; the marker and everything after it
/// are discarded.
pub struct StopScanner {
    stops: Vec<String>,
    holdback: usize,
    pending: String,
    finished: bool,
}

impl StopScanner {
    pub fn new(stops: &[String]) -> Self {
        let holdback = stops
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(1)
            .saturating_sub(1);
        Self {
            stops: stops.to_vec(),
            holdback,
            pending: String::new(),
            finished: false,
        }
    }

    /// Feed one piece. Returns the text that is safe to emit and whether a
    /// stop marker was reached.
    pub fn push(&mut self, piece: &str) -> (String, bool) {
        if self.finished {
            return (String::new(), true);
        }
        self.pending.push_str(piece);

        if let Some(index) = self
            .stops
            .iter()
            .filter_map(|stop| self.pending.find(stop.as_str()))
            .min()
        {
            let out = self.pending[..index].to_string();
            self.pending.clear();
            self.finished = true;
            return (out, true);
        }

        let char_count = self.pending.chars().count();
        if char_count <= self.holdback {
            return (String::new(), false);
        }

        let emit_count = char_count - self.holdback;
        let split = self
            .pending
            .char_indices()
            .nth(emit_count)
            .map(|(i, _)| i)
            .unwrap_or(self.pending.len());
        let tail = self.pending.split_off(split);
        let out = std::mem::replace(&mut self.pending, tail);
        (out, false)
    }

    /// Drain the held-back tail once generation ends without hitting a stop.
    pub fn flush(&mut self) -> String {
        if self.finished {
            return String::new();
        }
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend used by engine and resolver tests.

    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{Completion, CompletionRequest, LoadOptions, ModelHandle, TextBackend};
    use crate::error::{Error, Result};

    #[derive(Default)]
    pub struct FakeBackend {
        /// Number of handles currently alive.
        pub live_handles: Arc<AtomicUsize>,
        /// Highest live-handle count observed at construction time.
        pub live_at_construct: Arc<AtomicUsize>,
        /// Total number of constructions performed.
        pub constructions: Arc<AtomicUsize>,
        /// Fail construction outright.
        pub fail_construct: bool,
        /// Pieces emitted per generation (may include empty strings).
        pub script: Vec<String>,
        /// Fail after emitting this many pieces.
        pub fail_after: Option<usize>,
    }

    impl FakeBackend {
        pub fn scripted(pieces: &[&str]) -> Self {
            Self {
                script: pieces.iter().map(|p| p.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl TextBackend for FakeBackend {
        fn load(&self, _path: &Path, _options: &LoadOptions) -> Result<Box<dyn ModelHandle>> {
            if self.fail_construct {
                return Err(Error::BackendInit("scripted construction failure".into()));
            }
            let live = self.live_handles.load(Ordering::SeqCst);
            self.live_at_construct.fetch_max(live, Ordering::SeqCst);
            self.live_handles.fetch_add(1, Ordering::SeqCst);
            self.constructions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeHandle {
                script: self.script.clone(),
                fail_after: self.fail_after,
                live: self.live_handles.clone(),
            }))
        }
    }

    pub struct FakeHandle {
        script: Vec<String>,
        fail_after: Option<usize>,
        live: Arc<AtomicUsize>,
    }

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ModelHandle for FakeHandle {
        fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            if self.fail_after == Some(0) {
                return Err(Error::Inference("scripted generation failure".into()));
            }
            Ok(Completion {
                text: self.script.concat(),
                prompt_tokens: 7,
                completion_tokens: self.script.len(),
            })
        }

        fn complete_streaming(
            &self,
            _request: &CompletionRequest,
            emit: &mut dyn FnMut(String) -> bool,
        ) -> Result<Completion> {
            let mut text = String::new();
            for (index, piece) in self.script.iter().enumerate() {
                if self.fail_after == Some(index) {
                    return Err(Error::Inference("scripted generation failure".into()));
                }
                text.push_str(piece);
                if !emit(piece.clone()) {
                    break;
                }
            }
            if self.fail_after == Some(self.script.len()) {
                return Err(Error::Inference("scripted generation failure".into()));
            }
            Ok(Completion {
                text,
                prompt_tokens: 7,
                completion_tokens: self.script.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops() -> Vec<String> {
        vec!["Human:".to_string(), "System:".to_string()]
    }

    #[test]
    fn passes_text_through_without_stops() {
        let mut scanner = StopScanner::new(&stops());
        let mut out = String::new();
        for piece in ["Hello", ", ", "world"] {
            let (text, stopped) = scanner.push(piece);
            assert!(!stopped);
            out.push_str(&text);
        }
        out.push_str(&scanner.flush());
        assert_eq!(out, "Hello, world");
    }

    #[test]
    fn detects_stop_split_across_pieces() {
        let mut scanner = StopScanner::new(&stops());
        let mut out = String::new();

        let (text, stopped) = scanner.push("All done.\nHum");
        assert!(!stopped);
        out.push_str(&text);

        let (text, stopped) = scanner.push("an: next question");
        out.push_str(&text);
        assert!(stopped);
        assert_eq!(out, "All done.\n");
    }

    #[test]
    fn earliest_stop_wins() {
        let mut scanner = StopScanner::new(&stops());
        let (text, stopped) = scanner.push("okSystem: xHuman: y");
        assert!(stopped);
        assert_eq!(text, "ok");
    }

    #[test]
    fn push_after_stop_emits_nothing() {
        let mut scanner = StopScanner::new(&stops());
        let (_, stopped) = scanner.push("Human: hi");
        assert!(stopped);
        let (text, stopped) = scanner.push("more");
        assert!(stopped);
        assert!(text.is_empty());
        assert!(scanner.flush().is_empty());
    }
}
