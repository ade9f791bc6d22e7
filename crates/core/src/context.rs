//! Retrieved context snippets.

use serde::{Deserialize, Serialize};

/// A text fragment believed relevant to a query. Produced fresh per query,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub text: String,

    /// Similarity score as reported by the index. Ordering is what matters;
    /// the value is informational.
    pub score: f32,

    #[serde(default)]
    pub source: SnippetSource,
}

/// Where a snippet came from, as far as the index metadata says.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnippetSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
}

impl SnippetSource {
    /// Read the well-known metadata keys written at ingest time.
    pub fn from_metadata(metadata: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            story_id: metadata.get("story_id").and_then(integer),
            title: metadata
                .get("story_title")
                .and_then(|v| v.as_str())
                .map(String::from),
            url: metadata
                .get("story_url")
                .and_then(|v| v.as_str())
                .map(String::from),
            chunk_index: metadata
                .get("chunk_index")
                .and_then(integer)
                .and_then(|v| u32::try_from(v).ok()),
        }
    }
}

/// Pinecone hands numeric metadata back as floats (`4242.0`).
fn integer(value: &serde_json::Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
