//! ConversationPipeline: one query in, one answer (or fragment stream) out.
//!
//! Per query:
//!
//! 1. Reject blank queries, then resolve or create the conversation
//! 2. Persist the user message before anything is generated
//! 3. Load history and retrieve context concurrently
//! 4. Assemble the prompt
//! 5. Generate (batch) or relay fragments (stream)
//! 6. Persist the assistant message only after a successful completion

use std::sync::Arc;

use chrono::Utc;
use futures::Stream;
use hnrag_config::AppConfig;
use hnrag_core::error::{Error, Result, StoreError};
use hnrag_core::event::{DomainEvent, EventBus};
use hnrag_core::fragment::GenerationFragment;
use hnrag_core::message::{Conversation, ConversationId, Message, Sender};
use hnrag_core::store::ConversationStore;
use hnrag_providers::Backends;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::history::HistoryWindow;
use crate::prompt::PromptAssembler;
use crate::relay::{GenerationRelay, RelayStream};
use crate::retriever::ContextRetriever;

/// Error text for a blank query.
pub const MISSING_QUERY: &str = "Query parameter is missing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Batch,
    Stream,
}

/// An inbound query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,

    #[serde(default, alias = "conversation_id", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// A complete answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub answer: String,
    pub conversation_id: ConversationId,
}

pub enum PipelineOutput {
    Reply(ChatReply),
    Stream(PipelineStream),
}

/// What a streaming consumer sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Raw answer text, newlines intact.
    Text(String),
    /// The answer is complete and persisted.
    Done { conversation_id: ConversationId },
    /// Generation did not complete; nothing was persisted for it.
    Failed {
        conversation_id: ConversationId,
        reason: String,
    },
}

pub struct ConversationPipeline {
    store: Arc<dyn ConversationStore>,
    history: HistoryWindow,
    retriever: ContextRetriever,
    assembler: PromptAssembler,
    relay: GenerationRelay,
    event_bus: Arc<EventBus>,
}

struct Prepared {
    conversation_id: ConversationId,
    prompt: String,
}

impl ConversationPipeline {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        retriever: ContextRetriever,
        relay: GenerationRelay,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            history: HistoryWindow::new(store.clone(), HistoryWindow::DEFAULT_LIMIT),
            store,
            retriever,
            assembler: PromptAssembler::default(),
            relay,
            event_bus,
        }
    }

    /// Wire a pipeline from configuration and already-built backends.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn ConversationStore>,
        backends: Backends,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let retriever = ContextRetriever::new(backends.embedder, backends.index, event_bus.clone())
            .with_top_k(config.index.top_k)
            .with_timeouts(config.embedding.timeout(), config.index.timeout());
        let relay = GenerationRelay::from_config(backends.generator, &config.generation, event_bus.clone());

        Self::new(store, retriever, relay, event_bus).with_history_limit(config.history.limit)
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = HistoryWindow::new(self.store.clone(), limit);
        self
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Dispatch a request in the requested mode.
    pub async fn handle(&self, request: ChatRequest, mode: GenerationMode) -> Result<PipelineOutput> {
        let id = request.conversation_id.as_ref();
        match mode {
            GenerationMode::Batch => self.ask(&request.query, id).await.map(PipelineOutput::Reply),
            GenerationMode::Stream => self
                .ask_stream(&request.query, id)
                .await
                .map(PipelineOutput::Stream),
        }
    }

    /// Answer in one piece.
    ///
    /// Backend failures become a fallback answer. The fallback is stored as
    /// the assistant turn so every user message in the log has a reply.
    pub async fn ask(&self, query: &str, conversation_id: Option<&ConversationId>) -> Result<ChatReply> {
        let prepared = self.prepare(query, conversation_id, false).await?;

        let answer = self.relay.generate(&prepared.prompt).await;

        store_answer(
            self.store.as_ref(),
            &self.event_bus,
            &prepared.conversation_id,
            &answer,
            false,
        )
        .await?;

        Ok(ChatReply {
            answer,
            conversation_id: prepared.conversation_id,
        })
    }

    /// Answer incrementally. The user message is already stored when this
    /// returns; generation starts on the first poll of the stream.
    pub async fn ask_stream(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
    ) -> Result<PipelineStream> {
        let prepared = self.prepare(query, conversation_id, true).await?;

        Ok(PipelineStream {
            relay: self.relay.stream(prepared.prompt),
            store: self.store.clone(),
            event_bus: self.event_bus.clone(),
            conversation_id: prepared.conversation_id,
            finished: false,
        })
    }

    async fn prepare(
        &self,
        query: &str,
        conversation_id: Option<&ConversationId>,
        streaming: bool,
    ) -> Result<Prepared> {
        if query.trim().is_empty() {
            return Err(Error::BadRequest(MISSING_QUERY.into()));
        }

        let conversation = self.resolve(conversation_id).await?;
        let id = conversation.id;

        info!(conversation_id = %id, streaming, "Handling query");
        self.event_bus.publish(DomainEvent::QueryReceived {
            conversation_id: id.to_string(),
            query_preview: query.chars().take(80).collect(),
            streaming,
            timestamp: Utc::now(),
        });

        let message = self.store.append_message(&id, Sender::User, query).await?;
        self.publish_stored(&message);

        let (history, context) = tokio::join!(self.history.load(&id), self.retriever.retrieve(query));
        let history = history?;

        debug!(
            conversation_id = %id,
            history = history.len(),
            snippets = context.len(),
            "Assembling prompt"
        );
        let prompt = self.assembler.assemble(query, &history, &context);

        Ok(Prepared {
            conversation_id: id,
            prompt,
        })
    }

    async fn resolve(&self, conversation_id: Option<&ConversationId>) -> Result<Conversation> {
        match conversation_id.filter(|id| !id.as_str().trim().is_empty()) {
            Some(id) => self
                .store
                .find_conversation(id)
                .await?
                .ok_or_else(|| Error::BadRequest(format!("Conversation not found: {id}"))),
            None => Ok(self.store.create_conversation().await?),
        }
    }

    fn publish_stored(&self, message: &Message) {
        publish_stored(&self.event_bus, message);
    }
}

fn publish_stored(event_bus: &EventBus, message: &Message) {
    event_bus.publish(DomainEvent::MessageStored {
        conversation_id: message.conversation_id.to_string(),
        sender: message.sender.as_str().to_string(),
        seq: message.seq,
        timestamp: Utc::now(),
    });
}

async fn store_answer(
    store: &dyn ConversationStore,
    event_bus: &EventBus,
    conversation_id: &ConversationId,
    answer: &str,
    streaming: bool,
) -> std::result::Result<Message, StoreError> {
    let message = store
        .append_message(conversation_id, Sender::Assistant, answer)
        .await?;
    publish_stored(event_bus, &message);
    event_bus.publish(DomainEvent::ResponseGenerated {
        conversation_id: conversation_id.to_string(),
        streaming,
        answer_chars: answer.chars().count(),
        timestamp: Utc::now(),
    });
    Ok(message)
}

/// A streaming answer bound to its conversation.
///
/// The assistant message is stored inside the poll that sees the backend's
/// completion, before `Done` is handed out. Dropping the stream early stores
/// nothing and releases the backend connection.
pub struct PipelineStream {
    relay: RelayStream,
    store: Arc<dyn ConversationStore>,
    event_bus: Arc<EventBus>,
    conversation_id: ConversationId,
    finished: bool,
}

impl PipelineStream {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub async fn next(&mut self) -> Option<PipelineEvent> {
        if self.finished {
            return None;
        }

        let Some(fragment) = self.relay.next().await else {
            self.finished = true;
            return None;
        };

        match fragment {
            GenerationFragment::Text(text) => Some(PipelineEvent::Text(text)),
            GenerationFragment::Done => {
                self.finished = true;
                let stored = store_answer(
                    self.store.as_ref(),
                    &self.event_bus,
                    &self.conversation_id,
                    self.relay.accumulated(),
                    true,
                )
                .await;
                match stored {
                    Ok(_) => Some(PipelineEvent::Done {
                        conversation_id: self.conversation_id.clone(),
                    }),
                    Err(e) => {
                        error!(conversation_id = %self.conversation_id, error = %e, "Failed to store streamed answer");
                        Some(self.failed(e.to_string()))
                    }
                }
            }
            GenerationFragment::Error(reason) => {
                self.finished = true;
                Some(self.failed(reason))
            }
        }
    }

    fn failed(&self, reason: String) -> PipelineEvent {
        self.event_bus.publish(DomainEvent::StreamFailed {
            conversation_id: self.conversation_id.to_string(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        PipelineEvent::Failed {
            conversation_id: self.conversation_id.clone(),
            reason,
        }
    }

    /// Adapt into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = PipelineEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }

    /// Drain the stream into a complete reply.
    pub async fn collect(mut self) -> Result<ChatReply> {
        let mut answer = String::new();
        while let Some(event) = self.next().await {
            match event {
                PipelineEvent::Text(text) => answer.push_str(&text),
                PipelineEvent::Done { conversation_id } => {
                    return Ok(ChatReply {
                        answer,
                        conversation_id,
                    });
                }
                PipelineEvent::Failed { reason, .. } => return Err(Error::StreamFailed(reason)),
            }
        }
        Err(Error::StreamFailed("stream ended before completion".into()))
    }
}

impl Drop for PipelineStream {
    fn drop(&mut self) {
        if !self.finished {
            warn!(conversation_id = %self.conversation_id, "Stream consumer went away before completion");
            self.event_bus.publish(DomainEvent::StreamFailed {
                conversation_id: self.conversation_id.to_string(),
                reason: "consumer disconnected".into(),
                timestamp: Utc::now(),
            });
        }
    }
}
