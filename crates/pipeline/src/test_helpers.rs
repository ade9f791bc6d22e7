//! Scripted backends shared by the unit tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hnrag_core::backend::{
    ChunkReceiver, Embedder, GenerationBackend, IndexMatch, IndexRecord, VectorIndex,
};
use hnrag_core::error::BackendError;
use hnrag_core::fragment::GenerationFragment;
use tokio::sync::{Notify, mpsc};

use crate::relay::RelayStream;

/// What the scripted stream does after its chunks run out.
#[derive(Clone)]
enum Tail {
    End,
    Error(BackendError),
    Hang,
}

/// A generation backend that replays a fixed script.
pub struct ScriptedGenerator {
    answer: Result<String, BackendError>,
    chunks: Vec<Vec<u8>>,
    tail: Tail,
    stream_calls: Arc<AtomicUsize>,
    closed: Arc<Notify>,
}

impl ScriptedGenerator {
    fn with(answer: Result<String, BackendError>, chunks: Vec<Vec<u8>>) -> Self {
        Self {
            answer,
            chunks,
            tail: Tail::End,
            stream_calls: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(Notify::new()),
        }
    }

    /// Batch replies with `text`; streaming sends it as one record plus done.
    pub fn answer(text: &str) -> Self {
        Self::with(Ok(text.to_string()), vec![ndjson(&[(text, false), ("", true)])])
    }

    /// Every call fails with `error`.
    pub fn failing(error: BackendError) -> Self {
        Self::with(Err(error), vec![])
    }

    /// Streaming sends exactly these chunks, then closes.
    pub fn chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::with(
            Err(BackendError::NotConfigured("scripted for streaming only".into())),
            chunks,
        )
    }

    pub fn then_error(mut self, error: BackendError) -> Self {
        self.tail = Tail::Error(error);
        self
    }

    /// Keep the connection open after the chunks until the receiver goes away.
    pub fn then_hang(mut self) -> Self {
        self.tail = Tail::Hang;
        self
    }

    pub fn stream_calls(&self) -> Arc<AtomicUsize> {
        self.stream_calls.clone()
    }

    /// Notified once the sending side has observed its receiver closing.
    pub fn sender_closed(&self) -> Arc<Notify> {
        self.closed.clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        self.answer.clone()
    }

    async fn stream(&self, _prompt: &str) -> Result<ChunkReceiver, BackendError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if let (Err(e), true) = (&self.answer, self.chunks.is_empty()) {
            return Err(e.clone());
        }

        let (tx, rx) = mpsc::channel(16);
        let chunks = self.chunks.clone();
        let tail = self.tail.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    closed.notify_one();
                    return;
                }
            }
            match tail {
                Tail::End => {}
                Tail::Error(e) => {
                    let _ = tx.send(Err(e)).await;
                }
                Tail::Hang => tx.closed().await,
            }
            closed.notify_one();
        });

        Ok(rx)
    }
}

/// Newline-delimited generation records of `(text, done)`.
pub fn ndjson(records: &[(&str, bool)]) -> Vec<u8> {
    let mut out = String::new();
    for (text, done) in records {
        let record = serde_json::json!({ "model": "test", "response": text, "done": done });
        out.push_str(&record.to_string());
        out.push('\n');
    }
    out.into_bytes()
}

pub async fn collect_fragments(stream: &mut RelayStream) -> Vec<GenerationFragment> {
    let mut fragments = Vec::new();
    while let Some(fragment) = stream.next().await {
        fragments.push(fragment);
    }
    fragments
}

pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub fn empty() -> Self {
        Self { vector: vec![] }
    }
}

impl Default for FixedEmbedder {
    fn default() -> Self {
        Self {
            vector: vec![0.1, 0.2, 0.3],
        }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(self.vector.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Err(BackendError::Network("connection refused".into()))
    }
}

pub struct SlowEmbedder(pub Duration);

#[async_trait]
impl Embedder for SlowEmbedder {
    fn name(&self) -> &str {
        "slow"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        tokio::time::sleep(self.0).await;
        Ok(vec![0.1])
    }
}

/// An index with canned matches that records what it was asked.
pub struct FixedIndex {
    matches: Result<Vec<IndexMatch>, BackendError>,
    fail_upsert: bool,
    last_top_k: Mutex<Option<usize>>,
    upserted: Mutex<Vec<IndexRecord>>,
}

impl FixedIndex {
    pub fn new(matches: Vec<IndexMatch>) -> Self {
        Self {
            matches: Ok(matches),
            fail_upsert: false,
            last_top_k: Mutex::new(None),
            upserted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            matches: Err(BackendError::ApiError {
                status_code: 503,
                message: "index unavailable".into(),
            }),
            fail_upsert: true,
            ..Self::new(vec![])
        }
    }

    pub fn last_top_k(&self) -> Option<usize> {
        *self.last_top_k.lock().unwrap()
    }

    pub fn upserted(&self) -> Vec<IndexRecord> {
        self.upserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for FixedIndex {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, BackendError> {
        *self.last_top_k.lock().unwrap() = Some(top_k);
        self.matches.clone()
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize, BackendError> {
        if self.fail_upsert {
            return Err(BackendError::Network("index unreachable".into()));
        }
        let count = records.len();
        self.upserted.lock().unwrap().extend(records);
        Ok(count)
    }
}

pub fn text_match(id: &str, score: f32, text: &str) -> IndexMatch {
    let mut metadata = serde_json::Map::new();
    metadata.insert("text".into(), text.into());
    IndexMatch {
        id: id.into(),
        score,
        metadata: Some(metadata),
    }
}
