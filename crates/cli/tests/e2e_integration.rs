//! End-to-end tests across the whole stack: SQLite store, ingestion,
//! pipeline and HTTP gateway, with scripted model backends.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use hnrag_config::AppConfig;
use hnrag_core::backend::{
    ChunkReceiver, Embedder, GenerationBackend, IndexMatch, IndexRecord, VectorIndex,
};
use hnrag_core::error::BackendError;
use hnrag_core::event::EventBus;
use hnrag_core::sentinel;
use hnrag_gateway::{ApiV1State, build_router};
use hnrag_pipeline::{ConversationPipeline, Ingestor, Story};
use hnrag_providers::Backends;
use hnrag_store::SqliteStore;

// ── Scripted backends ────────────────────────────────────────────────────

/// Embeds text as word-count features so similar texts land close.
struct WordEmbedder;

#[async_trait]
impl Embedder for WordEmbedder {
    fn name(&self) -> &str {
        "words"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let lower = text.to_lowercase();
        Ok(["combinator", "rust", "database"]
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect())
    }
}

/// Brute-force in-process index.
#[derive(Default)]
struct MemoryIndex {
    records: Mutex<Vec<IndexRecord>>,
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, BackendError> {
        let records = self.records.lock().unwrap();
        let mut scored: Vec<IndexMatch> = records
            .iter()
            .map(|r| IndexMatch {
                id: r.id.clone(),
                score: r.values.iter().zip(vector).map(|(a, b)| a * b).sum(),
                metadata: Some(r.metadata.clone()),
            })
            .filter(|m| m.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize, BackendError> {
        let count = records.len();
        self.records.lock().unwrap().extend(records);
        Ok(count)
    }
}

/// Echoes whether the prompt carried the indexed context.
struct PromptEcho;

impl PromptEcho {
    fn answer(prompt: &str) -> String {
        if prompt.contains("startup accelerator") {
            "YC is a startup accelerator.\nIt funds startups.".into()
        } else {
            "I could not find an answer in the provided articles.".into()
        }
    }
}

#[async_trait]
impl GenerationBackend for PromptEcho {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        Ok(Self::answer(prompt))
    }

    async fn stream(&self, prompt: &str) -> Result<ChunkReceiver, BackendError> {
        let mut body = String::new();
        for word in Self::answer(prompt).split_inclusive(' ') {
            body.push_str(&serde_json::json!({ "response": word, "done": false }).to_string());
            body.push('\n');
        }
        body.push_str("{\"response\":\"\",\"done\":true}\n");

        let bytes = body.into_bytes();
        let chunks: Vec<Vec<u8>> = bytes.chunks(7).map(<[u8]>::to_vec).collect();
        let (tx, rx) = tokio::sync::mpsc::channel(chunks.len());
        for chunk in chunks {
            tx.try_send(Ok(chunk)).unwrap();
        }
        Ok(rx)
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Stack {
    router: axum::Router,
    _dir: tempfile::TempDir,
}

async fn stack() -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("hnrag.db");
    let store = Arc::new(SqliteStore::new(db.to_str().unwrap()).await.unwrap());

    let backends = Backends {
        embedder: Arc::new(WordEmbedder),
        index: Arc::new(MemoryIndex::default()),
        generator: Arc::new(PromptEcho),
    };

    let stories = vec![
        Story {
            id: 1,
            title: "Y Combinator".into(),
            url: Some("https://ycombinator.com".into()),
            text: "Y Combinator is a startup accelerator. Y Combinator funds startups twice a year."
                .into(),
        },
        Story {
            id: 2,
            title: "Rust".into(),
            url: None,
            text: "Rust is a systems programming language.".into(),
        },
    ];
    let report = Ingestor::new(backends.embedder.clone(), backends.index.clone(), store.clone())
        .with_chunking(64, 8)
        .ingest(&stories)
        .await
        .unwrap();
    assert_eq!(report.processed, 2);

    let config = AppConfig::default();
    let pipeline = ConversationPipeline::from_config(
        &config,
        store,
        backends,
        Arc::new(EventBus::default()),
    );
    let router = build_router(Arc::new(ApiV1State::new(Arc::new(pipeline))), &config.gateway);

    Stack { router, _dir: dir }
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_batch_answer_uses_ingested_context_and_persists() {
    let s = stack().await;

    let response = s
        .router
        .clone()
        .oneshot(post("/api/v1/chat", serde_json::json!({ "query": "What is Y Combinator?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
    assert_eq!(reply["answer"], "YC is a startup accelerator.\nIt funds startups.");
    let id = reply["conversationId"].as_str().unwrap().to_string();

    let response = s
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/conversations/{id}/messages"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let log: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
    let messages = log["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "user");
    assert_eq!(messages[1]["sender"], "assistant");
}

#[tokio::test]
async fn e2e_stream_then_follow_up_in_same_conversation() {
    let s = stack().await;

    let response = s
        .router
        .clone()
        .oneshot(post(
            "/api/v1/chat/stream",
            serde_json::json!({ "query": "Tell me about Y Combinator" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = text(response).await;

    let mut answer = String::new();
    let mut id = None;
    let mut event = "";
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            event = name;
        } else if let Some(data) = line.strip_prefix("data: ") {
            match event {
                "text" => answer.push_str(&sentinel::decode(data)),
                "done" => {
                    let done: serde_json::Value = serde_json::from_str(data).unwrap();
                    id = done["conversationId"].as_str().map(String::from);
                }
                other => panic!("unexpected event {other}: {data}"),
            }
        }
    }
    assert_eq!(answer, "YC is a startup accelerator.\nIt funds startups.");
    let id = id.unwrap();

    let response = s
        .router
        .clone()
        .oneshot(post(
            "/api/v1/chat",
            serde_json::json!({ "query": "Anything about databases?", "conversationId": id }),
        ))
        .await
        .unwrap();
    let reply: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
    assert_eq!(reply["conversationId"], id.as_str());

    let response = s
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/conversations/{id}/messages"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let log: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
    let messages = log["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(
        messages[1]["content"],
        "YC is a startup accelerator.\nIt funds startups."
    );
}

#[tokio::test]
async fn e2e_blank_query_is_rejected() {
    let s = stack().await;
    let response = s
        .router
        .oneshot(post("/api/v1/chat", serde_json::json!({ "query": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
    assert_eq!(error["error"], "Query parameter is missing");
}
