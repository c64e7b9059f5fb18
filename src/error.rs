//! Error types for mail-triage.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Knowledge-retrieval errors (vector search + reranking).
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Search against index {index} failed: {reason}")]
    SearchFailed { index: String, reason: String },

    #[error("Reranking failed: {reason}")]
    RerankFailed { reason: String },

    #[error("Invalid response from retrieval backend: {reason}")]
    InvalidResponse { reason: String },
}

/// Review channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("No review channel for party {party} within {waited:?}")]
    ChannelUnavailable { party: String, waited: Duration },

    #[error("Party {party} is not connected")]
    NotConnected { party: String },

    #[error("Review for party {party} timed out after {timeout:?}")]
    Timeout { party: String, timeout: Duration },

    #[error("Review for party {party} was cancelled")]
    Cancelled { party: String },
}

/// Persistence errors (outcome log + response templates).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors on the pipeline's critical path.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Draft generation failed: {0}")]
    DraftGeneration(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
