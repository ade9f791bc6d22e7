//! HTTP clients for the external services behind the pipeline.
//!
//! - [`OllamaGenerator`] and [`OllamaEmbedder`] talk to an Ollama server
//! - [`PineconeIndex`] talks to a Pinecone-compatible vector index

pub mod ollama;
pub mod pinecone;

use std::sync::Arc;

use hnrag_config::AppConfig;
use hnrag_core::backend::{Embedder, GenerationBackend, VectorIndex};
use hnrag_core::error::BackendError;

pub use ollama::{OllamaEmbedder, OllamaGenerator};
pub use pinecone::PineconeIndex;

/// The set of backends a pipeline needs.
#[derive(Clone)]
pub struct Backends {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn GenerationBackend>,
}

/// Build all backends from configuration.
///
/// A missing index URL is not an error here: the index reports
/// `NotConfigured` on use and retrieval degrades to an empty context.
pub fn build_from_config(config: &AppConfig) -> Result<Backends, BackendError> {
    if config.index.api_url.is_none() {
        tracing::warn!("index.api_url is not set; answers will have no retrieved context");
    }

    Ok(Backends {
        embedder: Arc::new(OllamaEmbedder::from_config(&config.embedding)?),
        index: Arc::new(PineconeIndex::from_config(&config.index)?),
        generator: Arc::new(OllamaGenerator::from_config(&config.generation)?),
    })
}
