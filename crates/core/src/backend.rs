//! Backend traits: the abstraction over the external services the pipeline
//! talks to: an embedding model, a vector index and a text generator.
//!
//! Implementations live in `hnrag-providers`; tests substitute scripted fakes.
//! The wire records used by the HTTP implementations are defined here too, so
//! the relay can decode generation streams without depending on a client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BackendError;

/// Raw chunks of a streaming generation response, in arrival order.
///
/// Chunk boundaries carry no meaning: a record may be split across chunks and
/// one chunk may hold several records.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<Vec<u8>, BackendError>>;

/// Converts text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// A human-readable name (e.g., "ollama").
    fn name(&self) -> &str;

    /// Embed a single text. An empty vector means "no embedding".
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, BackendError>;
}

/// Nearest-neighbour lookup over stored vectors with text payloads.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Return up to `top_k` matches, most relevant first, with metadata.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<IndexMatch>, BackendError>;

    /// Insert or replace vectors. Returns how many were written.
    async fn upsert(&self, records: Vec<IndexRecord>) -> std::result::Result<usize, BackendError>;
}

/// A text generator that can answer in one piece or incrementally.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Send a prompt and get the complete answer text.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError>;

    /// Send a prompt and get the raw response body as a chunk stream.
    ///
    /// Dropping the receiver must release the underlying connection.
    async fn stream(&self, prompt: &str) -> std::result::Result<ChunkReceiver, BackendError>;
}

// --- Embedding wire types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub embedding: Vec<f32>,
}

// --- Index wire types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_metadata: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexQueryResponse {
    #[serde(default)]
    pub matches: Vec<IndexMatch>,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl IndexMatch {
    /// The text payload, if the match carries one.
    pub fn text(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("text")?.as_str()
    }
}

/// A vector to write into the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexUpsertRequest {
    pub vectors: Vec<IndexRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUpsertResponse {
    #[serde(default)]
    pub upserted_count: usize,
}

// --- Generation wire types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

/// A complete (non-streaming) generation reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// One record of a streaming generation reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Text increment, possibly empty.
    #[serde(default)]
    pub response: Option<String>,

    /// Whether this is the final record.
    #[serde(default)]
    pub done: bool,

    /// Backend-reported failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
