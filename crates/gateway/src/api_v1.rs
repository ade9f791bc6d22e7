//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /api/v1/chat`: Ask a question, get the whole answer
//! - `POST /api/v1/chat/stream`: Ask a question, get an SSE stream
//! - `GET  /api/v1/conversations/{id}/messages`: Full message log of a conversation
//! - `GET  /api/v1/events`: SSE stream of domain events
//!
//! Streamed `text` events carry sentinel-encoded text (see
//! `hnrag_core::sentinel`); clients decode each event before display.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{error, info};

use hnrag_core::error::Error;
use hnrag_core::message::{ConversationId, Message};
use hnrag_core::sentinel;
use hnrag_pipeline::{ChatReply, ChatRequest, ConversationPipeline, PipelineEvent};

// ── State ─────────────────────────────────────────────────────────────────

pub struct ApiV1State {
    pub pipeline: Arc<ConversationPipeline>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl ApiV1State {
    pub fn new(pipeline: Arc<ConversationPipeline>) -> Self {
        Self {
            pipeline,
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedApiState = Arc<ApiV1State>;

pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/conversations/{id}/messages", get(messages_handler))
        .route("/events", get(events_handler))
        .with_state(state)
}

// ── Types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: Error) -> ApiError {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %e, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /api/v1/chat`
async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    info!(conversation_id = ?payload.conversation_id, "v1/chat request");

    state
        .pipeline
        .ask(&payload.query, payload.conversation_id.as_ref())
        .await
        .map(Json)
        .map_err(api_error)
}

/// `POST /api/v1/chat/stream`
///
/// Validation and persistence of the question happen before the response
/// starts, so those failures still get a JSON error with a status code.
async fn chat_stream_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(conversation_id = ?payload.conversation_id, "v1/chat/stream SSE request");

    let stream = state
        .pipeline
        .ask_stream(&payload.query, payload.conversation_id.as_ref())
        .await
        .map_err(api_error)?;

    let events = stream.into_stream().map(|event| Ok(sse_event(event)));
    Ok(Sse::new(events))
}

/// SSE framing for one pipeline event. Text is sentinel-encoded because SSE
/// data lines cannot carry raw line breaks.
fn sse_event(event: PipelineEvent) -> SseEvent {
    match event {
        PipelineEvent::Text(text) => SseEvent::default()
            .event("text")
            .data(sentinel::encode(&text)),
        PipelineEvent::Done { conversation_id } => SseEvent::default().event("done").data(
            serde_json::json!({ "done": true, "conversationId": conversation_id }).to_string(),
        ),
        PipelineEvent::Failed {
            conversation_id,
            reason,
        } => SseEvent::default().event("error").data(
            serde_json::json!({ "error": reason, "conversationId": conversation_id }).to_string(),
        ),
    }
}

/// `GET /api/v1/conversations/{id}/messages`
async fn messages_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let id = ConversationId(id);
    let store = state.pipeline.store();

    let found = store
        .find_conversation(&id)
        .await
        .map_err(|e| api_error(e.into()))?;
    if found.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Conversation not found: {id}"),
            }),
        ));
    }

    let messages = store.messages(&id).await.map_err(|e| api_error(e.into()))?;
    Ok(Json(MessagesResponse {
        conversation_id: id,
        messages,
    }))
}

/// `GET /api/v1/events`: SSE stream of domain events.
async fn events_handler(
    State(state): State<SharedApiState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.pipeline.event_bus().subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.kind()).data(data))
        });

    Sse::new(stream)
}
