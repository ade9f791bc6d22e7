//! The conversation-aware streaming RAG pipeline.
//!
//! A query flows through:
//!
//! 1. **HistoryWindow** and **ContextRetriever**, concurrently
//! 2. **PromptAssembler**, which composes the prompt
//! 3. **GenerationRelay**, batch or streaming
//! 4. **ConversationPipeline**, which persists both turns around generation
//!
//! `ingest` holds the offline side that fills the vector index.

pub mod conversation;
pub mod history;
pub mod ingest;
pub mod prompt;
pub mod relay;
pub mod retriever;

#[cfg(test)]
mod test_helpers;

pub use conversation::{
    ChatReply, ChatRequest, ConversationPipeline, GenerationMode, MISSING_QUERY, PipelineEvent,
    PipelineOutput, PipelineStream,
};
pub use history::{HistoryWindow, render_history};
pub use ingest::{IngestReport, Ingestor, Story, chunk_text};
pub use prompt::PromptAssembler;
pub use relay::{FrameDecoder, GenerationRelay, RelayState, RelayStream};
pub use retriever::ContextRetriever;
