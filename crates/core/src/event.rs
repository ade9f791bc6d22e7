//! Domain event system: the observability sink.
//!
//! The pipeline publishes an event whenever something worth watching happens,
//! including failures it recovers from locally (context degradation, batch
//! fallbacks). Subscribers (the gateway's event stream, tests) filter for what
//! they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A query was accepted for a conversation
    QueryReceived {
        conversation_id: String,
        query_preview: String,
        streaming: bool,
        timestamp: DateTime<Utc>,
    },

    /// Context retrieval finished
    ContextRetrieved {
        snippets: usize,
        timestamp: DateTime<Utc>,
    },

    /// Context retrieval failed and was degraded to empty
    ContextUnavailable {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Batch generation failed and a fallback answer was used
    GenerationFailed {
        backend: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A streaming generation ended without completing
    StreamFailed {
        conversation_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was appended to a conversation
    MessageStored {
        conversation_id: String,
        sender: String,
        seq: i64,
        timestamp: DateTime<Utc>,
    },

    /// A complete answer was produced and persisted
    ResponseGenerated {
        conversation_id: String,
        streaming: bool,
        answer_chars: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short name, used as the SSE event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueryReceived { .. } => "query_received",
            Self::ContextRetrieved { .. } => "context_retrieved",
            Self::ContextUnavailable { .. } => "context_unavailable",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::StreamFailed { .. } => "stream_failed",
            Self::MessageStored { .. } => "message_stored",
            Self::ResponseGenerated { .. } => "response_generated",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
