//! End-to-end pipeline scenarios against scripted backends and the
//! in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hnrag_core::backend::{ChunkReceiver, Embedder, GenerationBackend, IndexMatch, IndexRecord, VectorIndex};
use hnrag_core::error::{BackendError, Error};
use hnrag_core::event::EventBus;
use hnrag_core::message::Sender;
use hnrag_core::sentinel;
use hnrag_core::store::ConversationStore;
use hnrag_pipeline::{
    ContextRetriever, ConversationPipeline, GenerationRelay, MISSING_QUERY, PipelineEvent,
    RelayState,
};
use hnrag_store::InMemoryStore;

// --- Scripted backends ---

struct StaticEmbedder;

#[async_trait]
impl Embedder for StaticEmbedder {
    fn name(&self) -> &str {
        "static"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(vec![0.25; 8])
    }
}

struct StaticIndex(Vec<&'static str>);

#[async_trait]
impl VectorIndex for StaticIndex {
    fn name(&self) -> &str {
        "static"
    }

    async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, BackendError> {
        Ok(self
            .0
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = serde_json::Map::new();
                metadata.insert("text".into(), (*text).into());
                IndexMatch {
                    id: format!("{i}"),
                    score: 1.0 - i as f32 / 10.0,
                    metadata: Some(metadata),
                }
            })
            .collect())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize, BackendError> {
        Ok(records.len())
    }
}

/// Replies with `answer` in batch mode and replays `chunks` when streaming.
/// Every prompt it receives is kept in `prompts`.
#[derive(Default)]
struct Script {
    answer: String,
    chunks: Vec<Vec<u8>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl GenerationBackend for Script {
    fn name(&self) -> &str {
        "script"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }

    async fn stream(&self, prompt: &str) -> Result<ChunkReceiver, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let (tx, rx) = tokio::sync::mpsc::channel(self.chunks.len().max(1));
        for chunk in &self.chunks {
            // Capacity covers every chunk; the sender drops right after.
            let _ = tx.try_send(Ok(chunk.clone()));
        }
        Ok(rx)
    }
}

fn record(text: &str, done: bool) -> String {
    format!("{}\n", serde_json::json!({ "model": "llama3.2", "response": text, "done": done }))
}

fn pipeline(script: Script) -> (ConversationPipeline, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(EventBus::default());
    let retriever = ContextRetriever::new(
        Arc::new(StaticEmbedder),
        Arc::new(StaticIndex(vec![
            "Y Combinator is a startup accelerator founded in 2005.",
            "YC runs two batches a year.",
        ])),
        bus.clone(),
    );
    let relay = GenerationRelay::new(Arc::new(script), bus.clone());
    (
        ConversationPipeline::new(store.clone(), retriever, relay, bus),
        store,
    )
}

fn split_into(body: &[u8], size: usize) -> Vec<Vec<u8>> {
    body.chunks(size).map(<[u8]>::to_vec).collect()
}

// --- Scenarios ---

#[tokio::test]
async fn scenario_a_empty_query_is_rejected() {
    let (p, store) = pipeline(Script {
        answer: "unused".into(),
        chunks: vec![],
        ..Default::default()
    });
    let conversation = store.create_conversation().await.unwrap();

    let err = p.ask("", Some(&conversation.id)).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(ref m) if m == MISSING_QUERY));
    assert!(store.messages(&conversation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_b_batch_answer_creates_conversation() {
    let (p, store) = pipeline(Script {
        answer: "YC is a startup accelerator.".into(),
        chunks: vec![],
        ..Default::default()
    });

    let reply = p.ask("What is Y Combinator?", None).await.unwrap();
    assert_eq!(reply.answer, "YC is a startup accelerator.");

    let messages = store.messages(&reply.conversation_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::User);
    assert_eq!(messages[0].content, "What is Y Combinator?");
    assert_eq!(messages[1].sender, Sender::Assistant);
    assert_eq!(messages[1].content, "YC is a startup accelerator.");
}

#[tokio::test]
async fn scenario_c_streamed_newlines_survive() {
    let body = [record("Hel", false), record("lo\n", false), record("", true)].concat();
    let bytes = body.as_bytes();
    // Three arbitrary chunks that split records mid-way.
    let chunks = vec![bytes[..10].to_vec(), bytes[10..57].to_vec(), bytes[57..].to_vec()];

    let (p, store) = pipeline(Script {
        answer: String::new(),
        chunks,
        ..Default::default()
    });

    let mut stream = p.ask_stream("Say hello", None).await.unwrap();
    let mut wire = Vec::new();
    let mut done_id = None;
    while let Some(event) = stream.next().await {
        match event {
            PipelineEvent::Text(text) => wire.push(sentinel::encode(&text)),
            PipelineEvent::Done { conversation_id } => done_id = Some(conversation_id),
            PipelineEvent::Failed { reason, .. } => panic!("stream failed: {reason}"),
        }
    }

    assert_eq!(wire.concat(), format!("Hello{}", sentinel::NEWLINE_SENTINEL));
    let received: String = wire.iter().map(|w| sentinel::decode(w)).collect();
    assert_eq!(received, "Hello\n");

    let id = done_id.unwrap();
    let messages = store.messages(&id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Hello\n");
}

#[tokio::test]
async fn scenario_d_truncated_stream_is_not_persisted() {
    let (p, store) = pipeline(Script {
        answer: String::new(),
        chunks: vec![record("Hel", false).into_bytes()],
        ..Default::default()
    });

    let stream = p.ask_stream("Say hello", None).await.unwrap();
    let id = stream.conversation_id().clone();
    let err = stream.collect().await.unwrap_err();
    assert!(matches!(err, Error::StreamFailed(_)));

    let messages = store.messages(&id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, Sender::User);
}

#[tokio::test]
async fn chunk_boundaries_do_not_change_the_outcome() {
    let bus = Arc::new(EventBus::default());
    let complete = [
        record("The ", false),
        record("answer\nis ", false),
        record("caf\u{e9} \u{1f980}", false),
        record("", true),
    ]
    .concat();
    let truncated = [record("The ", false), record("answer", false)].concat();

    for (body, expected_state, expected_text) in [
        (complete.as_bytes(), RelayState::Completed, "The answer\nis caf\u{e9} \u{1f980}"),
        (truncated.as_bytes(), RelayState::Failed, "The answer"),
    ] {
        for size in 1..=body.len() {
            let relay = GenerationRelay::new(
                Arc::new(Script {
                    answer: String::new(),
                    chunks: split_into(body, size),
                    ..Default::default()
                }),
                bus.clone(),
            );
            let mut stream = relay.stream("p");
            while stream.next().await.is_some() {}
            assert_eq!(stream.state(), expected_state, "chunk size {size}");
            assert_eq!(stream.accumulated(), expected_text, "chunk size {size}");
        }

        for cut in 1..body.len() {
            let relay = GenerationRelay::new(
                Arc::new(Script {
                    answer: String::new(),
                    chunks: vec![body[..cut].to_vec(), body[cut..].to_vec()],
                    ..Default::default()
                }),
                bus.clone(),
            );
            let mut stream = relay.stream("p");
            while stream.next().await.is_some() {}
            assert_eq!(stream.state(), expected_state, "cut at {cut}");
            assert_eq!(stream.accumulated(), expected_text, "cut at {cut}");
        }
    }
}

#[tokio::test]
async fn history_feeds_follow_up_questions_in_order() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let (p, store) = pipeline(Script {
        answer: "ok".into(),
        prompts: prompts.clone(),
        ..Default::default()
    });

    let first = p.ask("first question", None).await.unwrap();
    p.ask("second question", Some(&first.conversation_id))
        .await
        .unwrap();

    let recent = store.recent_messages(&first.conversation_id, 5).await.unwrap();
    let contents: Vec<_> = recent.iter().rev().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["first question", "ok", "second question", "ok"]);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(
        prompts[1].contains("User: first question\nAssistant: ok\nUser: second question"),
        "history missing or out of order in prompt:\n{}",
        prompts[1]
    );
    let history_at = prompts[1].find("User: first question").unwrap();
    let question_at = prompts[1].find("Latest Question: second question").unwrap();
    assert!(history_at < question_at);
}
