//! `hnrag ask`: one question from the command line.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use hnrag_core::event::EventBus;
use hnrag_core::message::ConversationId;
use hnrag_pipeline::{ConversationPipeline, PipelineEvent};

pub async fn run(
    path: Option<&Path>,
    query: &str,
    conversation: Option<String>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    let stores = hnrag_store::open(&config.storage).await?;
    let backends = hnrag_providers::build_from_config(&config)?;
    let pipeline = ConversationPipeline::from_config(
        &config,
        stores.conversations,
        backends,
        Arc::new(EventBus::default()),
    );

    let conversation = conversation.map(ConversationId);

    if !stream {
        let reply = pipeline.ask(query, conversation.as_ref()).await?;
        println!("{}", reply.answer);
        println!();
        println!("conversation: {}", reply.conversation_id);
        return Ok(());
    }

    let mut answer = pipeline.ask_stream(query, conversation.as_ref()).await?;
    let mut stdout = std::io::stdout();
    while let Some(event) = answer.next().await {
        match event {
            PipelineEvent::Text(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            PipelineEvent::Done { conversation_id } => {
                println!();
                println!();
                println!("conversation: {conversation_id}");
            }
            PipelineEvent::Failed {
                conversation_id,
                reason,
            } => {
                println!();
                eprintln!("conversation: {conversation_id}");
                return Err(format!("Answer stream failed: {reason}").into());
            }
        }
    }

    Ok(())
}
