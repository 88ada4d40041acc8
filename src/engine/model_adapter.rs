// ── Model Adapter (C3) ───────────────────────────────────────────────────
//
// Wraps a local tokenizer + generator pair behind a narrow interface so the
// rest of the engine never touches model internals directly. Generation is
// synchronous CPU/GPU-bound work; it is offloaded via
// `tokio::task::spawn_blocking` so it never blocks the async request
// handlers that share the runtime — the same cooperative-offload shape used
// to keep blocking SQLite calls off the executor thread.
//
// The model loads in-process at server startup rather than calling out to a
// remote inference service; `Generator` is the seam, kept as a trait object
// so a real backend can be dropped in without touching call sites.

use std::sync::Arc;
use std::time::Duration;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{TokenCount, TokenCountSource};
use crate::engine::token_counter::TokenCounter;

/// One generation request: a fully assembled prompt plus the stop sequences
/// and max-output-tokens bound the caller wants enforced.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub stop_tokens: Vec<String>,
    pub max_output_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub output_tokens: i64,
}

/// The narrow interface a concrete local backend implements. Blocking is
/// expected and required — callers offload via `spawn_blocking`.
pub trait Generator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> EngineResult<GenerationResult>;
}

/// Deterministic placeholder backend. Produces clearly-marked stand-in
/// prose of roughly the requested length so downstream packing/compaction
/// logic can be exercised without a real model wired in. Never used for
/// anything but local development/tests — production deployments must
/// supply a real `Generator`.
pub struct PlaceholderGenerator {
    counter: TokenCounter,
}

impl PlaceholderGenerator {
    pub fn new(counter: TokenCounter) -> Self {
        Self { counter }
    }
}

impl Generator for PlaceholderGenerator {
    fn generate(&self, request: &GenerationRequest) -> EngineResult<GenerationResult> {
        if request.max_output_tokens <= 0 {
            return Err(EngineError::BadRequest("max_output_tokens must be positive".into()));
        }
        let approx_chars = self.counter.chars_for_tokens(request.max_output_tokens);
        let mut text = String::from("The storyteller continues, weaving the next moment of the tale.");
        while self.counter.count(&text).count < request.max_output_tokens && text.len() < approx_chars * 2 {
            text.push_str(" The room settles into quiet, waiting for what comes next.");
        }
        for stop in &request.stop_tokens {
            if let Some(pos) = text.find(stop.as_str()) {
                text.truncate(pos);
            }
        }
        let output_tokens = self.counter.count(&text).count;
        Ok(GenerationResult { text, output_tokens })
    }
}

pub struct ModelAdapter {
    generator: Arc<dyn Generator>,
    pub counter: TokenCounter,
    pub timeout: Duration,
}

impl ModelAdapter {
    pub fn new(generator: Arc<dyn Generator>, counter: TokenCounter, timeout: Duration) -> Self {
        Self { generator, counter, timeout }
    }

    pub fn placeholder(counter: TokenCounter, timeout: Duration) -> Self {
        let generator = Arc::new(PlaceholderGenerator::new(counter.clone()));
        Self::new(generator, counter, timeout)
    }

    /// `Tokenize(text) -> int`.
    pub fn count_tokens(&self, text: &str) -> TokenCount {
        self.counter.count(text)
    }

    /// `Generate(prompt, stopTokens) -> Text`. Offloads to a blocking
    /// thread and enforces `self.timeout`, surfacing `ModelTimeout` on
    /// expiry and `ModelUnavailable` if the worker thread panics.
    pub async fn generate(&self, request: GenerationRequest) -> EngineResult<GenerationResult> {
        let generator = self.generator.clone();
        let fut = tokio::task::spawn_blocking(move || generator.generate(&request));

        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(engine_err))) => Err(engine_err),
            Ok(Err(join_err)) => Err(EngineError::ModelUnavailable(format!("generator task panicked: {join_err}"))),
            Err(_elapsed) => Err(EngineError::ModelTimeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ModelAdapter {
        ModelAdapter::placeholder(TokenCounter::heuristic(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn generate_respects_stop_tokens() {
        let adapter = adapter();
        let result = adapter
            .generate(GenerationRequest {
                prompt: "Once upon a time".into(),
                stop_tokens: vec!["quiet".into()],
                max_output_tokens: 50,
            })
            .await
            .unwrap();
        assert!(!result.text.contains("quiet"));
    }

    #[tokio::test]
    async fn generate_rejects_non_positive_budget() {
        let adapter = adapter();
        let err = adapter
            .generate(GenerationRequest { prompt: "x".into(), stop_tokens: vec![], max_output_tokens: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn count_tokens_is_estimated_without_a_real_backend() {
        let adapter = adapter();
        assert_eq!(adapter.count_tokens("hello").source, TokenCountSource::Estimated);
    }
}
