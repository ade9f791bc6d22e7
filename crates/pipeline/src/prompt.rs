//! Deterministic prompt assembly.
//!
//! The prompt is a pure function of (query, history, context). Section
//! order is fixed: instruction, history, context, question, answer cue.

use hnrag_core::context::ContextSnippet;
use hnrag_core::message::Message;

use crate::history::render_history;

pub const DEFAULT_INSTRUCTION: &str = "You are an intelligent assistant for Hacker News.\n\
Answer the following question based *only* on the provided context.\n\
If the context does not contain the answer, say \"I could not find an answer in the provided articles.\"";

/// Placed between context snippets.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    instruction: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }
}

impl PromptAssembler {
    pub fn with_instruction(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    pub fn assemble(&self, query: &str, history: &[Message], context: &[ContextSnippet]) -> String {
        let context = context
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        format!(
            "{instruction}\n\n\
             Here is the recent conversation history:\n---\n{history}\n---\n\n\
             Here is the relevant context from news articles:\n---\n{context}\n---\n\n\
             Latest Question: {query}\n\n\
             Answer:",
            instruction = self.instruction,
            history = render_history(history),
        )
    }
}
