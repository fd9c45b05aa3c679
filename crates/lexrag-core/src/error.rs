//! Error taxonomy for the engine.
//!
//! Three failure classes matter to callers:
//!
//! - **Fatal at startup** — [`Error::Config`]. Invalid chunking or
//!   retrieval parameters are rejected when the component is constructed,
//!   never per call.
//! - **Recoverable** — [`Error::Unavailable`]. An unreachable embedding
//!   or language-model backend switches the algorithm path (hybrid →
//!   keyword-only retrieval, or "model failed, caller may retry"); it is
//!   never retried inside the engine.
//! - **Fatal to the single request** — everything else. These carry
//!   enough context (document, chunk, query) for the caller to log and
//!   retry externally.
//!
//! Grounding violations are deliberately *not* an error variant: a
//! generated answer citing an unknown label is sanitized and reported on
//! the answer itself as a quality flag.

use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, detected at component construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// A backing service cannot currently be reached or loaded.
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    /// The input to a single call was unusable (empty query, empty text).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Embedding computation failed for a non-availability reason.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The language model returned an unusable response.
    #[error("language model error: {0}")]
    Llm(String),

    /// The storage backend failed to execute an operation.
    #[error("store error: {0}")]
    Store(String),

    /// Persisted state violates an engine invariant (dimension mismatch,
    /// embedding referencing a missing chunk).
    #[error("storage corruption: {0}")]
    StorageCorruption(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::StorageCorruption(msg.into())
    }

    /// True for the recoverable class that triggers a fallback path
    /// instead of propagating as a hard failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
