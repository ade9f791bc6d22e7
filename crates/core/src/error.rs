//! Error types for the hnrag domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! carries the taxonomy the pipeline reports to its callers.

use thiserror::Error;

/// The top-level error type for all hnrag operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller sent something unusable (blank query, unknown conversation).
    #[error("{0}")]
    BadRequest(String),

    /// Embedding or index lookup failed. Recovered locally by the retriever.
    #[error("Context unavailable: {0}")]
    ContextUnavailable(#[from] ContextError),

    /// The generation backend failed in batch mode.
    #[error("Generation error: {0}")]
    Generation(#[from] BackendError),

    /// A streaming generation ended without a terminal `done` record.
    #[error("Stream failed: {0}")]
    StreamFailed(String),

    /// The persistence store failed. Always fatal for the current request.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error should be reported with a client-error status.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure talking to an external HTTP backend (generation, embedding, index).
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Transport-class failures never reached a well-formed backend reply.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::StreamInterrupted(_) | Self::NotConfigured(_)
        )
    }
}

/// Why no context could be retrieved for a query.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding backend returned an empty vector")]
    EmptyEmbedding,

    #[error("Vector index query failed: {0}")]
    Index(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
