//! Offline ingestion: split stories into overlapping chunks, embed each
//! chunk and upsert it into the vector index.
//!
//! The ledger makes runs idempotent. A story is marked processed only after
//! its vectors were written.

use std::sync::Arc;

use hnrag_core::backend::{Embedder, IndexRecord, VectorIndex};
use hnrag_core::error::{Error, Result};
use hnrag_core::store::IngestLedger;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A story with its article text already fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks_upserted: usize,
}

/// Word windows of `chunk_size`, one starting every `chunk_size - overlap`
/// words, until the start passes the end of the text.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = chunk_size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    (0..words.len())
        .step_by(step)
        .map(|start| words[start..(start + size).min(words.len())].join(" "))
        .collect()
}

pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    ledger: Arc<dyn IngestLedger>,
    chunk_size: usize,
    overlap: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        ledger: Arc<dyn IngestLedger>,
    ) -> Self {
        Self {
            embedder,
            index,
            ledger,
            chunk_size: 512,
            overlap: 50,
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    /// Ingest stories one by one. Backend failures skip the story and are
    /// counted; ledger failures abort the run.
    pub async fn ingest(&self, stories: &[Story]) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for story in stories {
            if self.ledger.is_processed(story.id).await? {
                debug!(story_id = story.id, "Already processed");
                report.skipped += 1;
                continue;
            }

            let chunks = chunk_text(&story.text, self.chunk_size, self.overlap);
            if chunks.is_empty() {
                debug!(story_id = story.id, "No text to index");
                report.skipped += 1;
                continue;
            }

            let records = match self.embed_story(story, chunks).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(story_id = story.id, error = %e, "Embedding failed, skipping story");
                    report.failed += 1;
                    continue;
                }
            };

            let count = records.len();
            match self.index.upsert(records).await {
                Ok(_) => {
                    self.ledger.mark_processed(story.id).await?;
                    report.processed += 1;
                    report.chunks_upserted += count;
                    debug!(story_id = story.id, chunks = count, "Indexed story");
                }
                Err(e) => {
                    warn!(story_id = story.id, error = %e, "Upsert failed, skipping story");
                    report.failed += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            chunks = report.chunks_upserted,
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn embed_story(&self, story: &Story, chunks: Vec<String>) -> Result<Vec<IndexRecord>> {
        let mut records = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.into_iter().enumerate() {
            let values = self.embedder.embed(&chunk).await?;
            if values.is_empty() {
                return Err(Error::Internal(format!(
                    "empty embedding for chunk {i} of story {}",
                    story.id
                )));
            }

            let mut metadata = serde_json::Map::new();
            metadata.insert("story_id".into(), story.id.into());
            metadata.insert("story_title".into(), story.title.clone().into());
            metadata.insert(
                "story_url".into(),
                story.url.clone().map_or(serde_json::Value::Null, Into::into),
            );
            metadata.insert("chunk_index".into(), i.into());
            metadata.insert("text".into(), chunk.into());

            records.push(IndexRecord {
                id: format!("{}-{i}", story.id),
                values,
                metadata,
            });
        }

        Ok(records)
    }
}
