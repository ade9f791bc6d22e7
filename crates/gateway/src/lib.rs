//! HTTP API gateway for hnrag.
//!
//! Exposes the conversation pipeline over JSON and SSE, plus a health
//! check. Built on Axum.

pub mod api_v1;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use hnrag_config::{AppConfig, GatewayConfig};
use hnrag_core::event::EventBus;
use hnrag_pipeline::ConversationPipeline;

pub use api_v1::{ApiV1State, SharedApiState};

/// Request bodies larger than this are rejected.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}

/// CORS for the configured browser origins. Unparseable origins are skipped.
fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Build the full router: health check plus the v1 API under `/api/v1`.
pub fn build_router(state: SharedApiState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/api/v1", api_v1::v1_router(state))
        .layer(
            ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(cors_layer(config))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
}

/// Start the gateway HTTP server.
///
/// Opens the store, builds the backends and the pipeline once, and shares
/// them across requests.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let stores = hnrag_store::open(&config.storage).await?;
    let backends = hnrag_providers::build_from_config(&config)?;
    let event_bus = Arc::new(EventBus::default());

    let pipeline = ConversationPipeline::from_config(
        &config,
        stores.conversations,
        backends,
        event_bus,
    );
    let state = Arc::new(ApiV1State::new(Arc::new(pipeline)));
    let app = build_router(state, &config.gateway);

    info!(
        addr = %addr,
        model = %config.generation.model,
        storage = %config.storage.backend,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
