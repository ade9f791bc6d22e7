//! Bounded, chronological view of a conversation's recent messages.

use std::sync::Arc;

use hnrag_core::error::StoreError;
use hnrag_core::message::{ConversationId, Message};
use hnrag_core::store::ConversationStore;

/// Loads the last `limit` messages of a conversation, oldest first.
pub struct HistoryWindow {
    store: Arc<dyn ConversationStore>,
    limit: usize,
}

impl HistoryWindow {
    pub const DEFAULT_LIMIT: usize = 5;

    pub fn new(store: Arc<dyn ConversationStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The most recent messages in chronological order.
    ///
    /// Empty for a conversation without messages; `ConversationNotFound`
    /// for an unknown id.
    pub async fn load(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        let mut messages = self
            .store
            .recent_messages(conversation_id, self.limit)
            .await?;
        // Stores hand back newest first; prompts need oldest first.
        messages.reverse();
        Ok(messages)
    }
}

/// Render messages as `"<Sender>: <content>"` lines.
pub fn render_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.sender.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
