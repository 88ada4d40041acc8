// ── Atoms: Error Types ─────────────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (budget, model, retrieval, db…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • `EngineError` → `String` conversion is provided via `Display` so that
//     HTTP handlers can map to a JSON error body without boilerplate.
//   • No variant carries secret material in its message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Non-trimmable required prompt segments exceed the model's safe limit.
    #[error("prompt too large: required {required} tokens, limit {limit}")]
    PromptTooLarge { required: i64, limit: i64 },

    /// Tokenizer/generator init failed or a generate call errored.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A generate call exceeded its deadline.
    #[error("model call timed out after {0:?}")]
    ModelTimeout(std::time::Duration),

    /// A single retrieval source failed; recovered locally by the caller.
    #[error("extraction failed for {url}: {message}")]
    ExtractionFailed { url: String, message: String },

    /// A summarization attempt failed; retried once by the caller before
    /// this is surfaced, at which point the trigger is abandoned silently.
    #[error("summary failed: {0}")]
    SummaryFailed(String),

    /// Persistence-layer: referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence-layer: caller does not own the referenced entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request validation failure (e.g. world token count over limit).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Process-level configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn extraction_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExtractionFailed { url: url.into(), message: message.into() }
    }

    pub fn prompt_too_large(required: i64, limit: i64) -> Self {
        Self::PromptTooLarge { required, limit }
    }
}

// ── Migration bridge: String → EngineError ─────────────────────────────────

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}
