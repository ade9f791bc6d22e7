//! `hnrag history`: print a conversation.

use std::path::Path;

use hnrag_core::message::ConversationId;

pub async fn run(path: Option<&Path>, conversation: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    let stores = hnrag_store::open(&config.storage).await?;
    let id = ConversationId::from(conversation);

    if stores.conversations.find_conversation(&id).await?.is_none() {
        return Err(format!("Conversation not found: {id}").into());
    }

    for message in stores.conversations.messages(&id).await? {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%Y-%m-%d %H:%M:%S"),
            message.sender.label(),
            message.content
        );
    }

    Ok(())
}
