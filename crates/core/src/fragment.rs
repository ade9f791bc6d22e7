//! Normalized units of incrementally generated output.

use serde::{Deserialize, Serialize};

/// One unit emitted by the generation relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum GenerationFragment {
    /// An incremental chunk of answer text, raw (newlines intact).
    Text(String),
    /// Terminal: the backend signalled completion.
    Done,
    /// Terminal: the stream failed and will produce nothing more.
    Error(String),
}

impl GenerationFragment {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}
