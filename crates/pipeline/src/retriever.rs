//! Query → embedding → nearest neighbours → context snippets.
//!
//! Retrieval failures never fail a request. [`ContextRetriever::retrieve`]
//! degrades to an empty context, logs the cause and publishes
//! `ContextUnavailable`; callers are not told context was omitted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hnrag_core::backend::{Embedder, VectorIndex};
use hnrag_core::context::{ContextSnippet, SnippetSource};
use hnrag_core::error::ContextError;
use hnrag_core::event::{DomainEvent, EventBus};
use tracing::{debug, warn};

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    embed_timeout: Duration,
    index_timeout: Duration,
    event_bus: Arc<EventBus>,
}

impl ContextRetriever {
    pub const DEFAULT_TOP_K: usize = 3;

    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k: Self::DEFAULT_TOP_K,
            embed_timeout: Duration::from_secs(10),
            index_timeout: Duration::from_secs(10),
            event_bus,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Bound the wait on the embedding call and the index call.
    pub fn with_timeouts(mut self, embed: Duration, index: Duration) -> Self {
        self.embed_timeout = embed;
        self.index_timeout = index;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve context, reporting why it could not be retrieved.
    ///
    /// Snippets keep the index's order. Matches without a text payload are
    /// dropped.
    pub async fn try_retrieve(&self, query: &str) -> Result<Vec<ContextSnippet>, ContextError> {
        let embedding = tokio::time::timeout(self.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| ContextError::Timeout {
                stage: "embedding",
                secs: self.embed_timeout.as_secs(),
            })?
            .map_err(|e| ContextError::Embedding(e.to_string()))?;

        if embedding.is_empty() {
            return Err(ContextError::EmptyEmbedding);
        }

        let matches = tokio::time::timeout(self.index_timeout, self.index.query(&embedding, self.top_k))
            .await
            .map_err(|_| ContextError::Timeout {
                stage: "index query",
                secs: self.index_timeout.as_secs(),
            })?
            .map_err(|e| ContextError::Index(e.to_string()))?;

        let total = matches.len();
        let snippets: Vec<ContextSnippet> = matches
            .into_iter()
            .filter_map(|m| {
                let text = m.text()?.to_string();
                let source = m
                    .metadata
                    .as_ref()
                    .map(SnippetSource::from_metadata)
                    .unwrap_or_default();
                Some(ContextSnippet {
                    text,
                    score: m.score,
                    source,
                })
            })
            .take(self.top_k)
            .collect();

        debug!(
            matches = total,
            snippets = snippets.len(),
            embedder = self.embedder.name(),
            index = self.index.name(),
            "Retrieved context"
        );
        Ok(snippets)
    }

    /// Retrieve context, degrading to an empty sequence on any failure.
    pub async fn retrieve(&self, query: &str) -> Vec<ContextSnippet> {
        match self.try_retrieve(query).await {
            Ok(snippets) => {
                self.event_bus.publish(DomainEvent::ContextRetrieved {
                    snippets: snippets.len(),
                    timestamp: Utc::now(),
                });
                snippets
            }
            Err(e) => {
                warn!(error = %e, "Context unavailable, answering without it");
                self.event_bus.publish(DomainEvent::ContextUnavailable {
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                Vec::new()
            }
        }
    }
}
