//! In-memory store, for tests and ephemeral runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hnrag_core::error::StoreError;
use hnrag_core::message::{Conversation, ConversationId, Message, Sender};
use hnrag_core::store::{ConversationStore, IngestLedger};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Log {
    conversation: Conversation,
    messages: Vec<Message>,
}

/// Keeps conversations and the ingest ledger in process memory.
pub struct InMemoryStore {
    logs: Arc<RwLock<HashMap<ConversationId, Log>>>,
    processed: Arc<RwLock<HashSet<i64>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(RwLock::new(HashMap::new())),
            processed: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_conversation(&self) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new();
        self.logs.write().await.insert(
            conversation.id.clone(),
            Log {
                conversation: conversation.clone(),
                messages: Vec::new(),
            },
        );
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .logs
            .read()
            .await
            .get(id)
            .map(|log| log.conversation.clone()))
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender: Sender,
        content: &str,
    ) -> Result<Message, StoreError> {
        // seq is assigned under the write lock so concurrent appends serialize.
        let mut logs = self.logs.write().await;
        let log = logs
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            seq: log.messages.len() as i64 + 1,
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        log.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let logs = self.logs.read().await;
        let log = logs
            .get(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        Ok(log.messages.iter().rev().take(limit).cloned().collect())
    }

    async fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        let logs = self.logs.read().await;
        let log = logs
            .get(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        Ok(log.messages.clone())
    }
}

#[async_trait]
impl IngestLedger for InMemoryStore {
    async fn is_processed(&self, story_id: i64) -> Result<bool, StoreError> {
        Ok(self.processed.read().await.contains(&story_id))
    }

    async fn mark_processed(&self, story_id: i64) -> Result<(), StoreError> {
        self.processed.write().await.insert(story_id);
        Ok(())
    }
}
