//! Store traits for durable conversations and the ingest ledger.
//!
//! Implementations: SQLite, in-memory (for testing and ephemeral runs).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, Message, Sender};

/// Durable, append-only conversation log.
///
/// Ordering is decided by the store: `append_message` assigns `seq` and
/// `created_at` at write time, so concurrent writers to the same conversation
/// still yield a single deterministic order.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Create a new, empty conversation.
    async fn create_conversation(&self) -> std::result::Result<Conversation, StoreError>;

    /// Look a conversation up by id.
    async fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<Conversation>, StoreError>;

    /// Append a message. Fails with `ConversationNotFound` for unknown ids.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender: Sender,
        content: &str,
    ) -> std::result::Result<Message, StoreError>;

    /// The `limit` most recent messages, newest first.
    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// Every message of a conversation, oldest first.
    async fn messages(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Vec<Message>, StoreError>;
}

/// Remembers which source stories have already been embedded and indexed.
#[async_trait]
pub trait IngestLedger: Send + Sync {
    async fn is_processed(&self, story_id: i64) -> std::result::Result<bool, StoreError>;

    /// Idempotent.
    async fn mark_processed(&self, story_id: i64) -> std::result::Result<(), StoreError>;
}
