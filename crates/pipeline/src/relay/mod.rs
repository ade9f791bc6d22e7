//! GenerationRelay drives the generation backend in batch or streaming
//! mode behind one interface.
//!
//! Batch mode never fails from the caller's point of view: backend errors
//! become a fixed fallback answer, logged and published as
//! `GenerationFailed`. Streaming mode hands out a [`RelayStream`].

pub mod frame;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hnrag_core::backend::GenerationBackend;
use hnrag_core::error::BackendError;
use hnrag_core::event::{DomainEvent, EventBus};
use tracing::{debug, warn};

pub use frame::FrameDecoder;
pub use stream::{RelayState, RelayStream};

/// Answer used when the backend could not be reached.
pub const CONNECTION_FALLBACK: &str = "Sorry, there was an error connecting to the AI service.";

/// Answer used when the backend replied with an error or garbage.
pub const PROCESSING_FALLBACK: &str = "Sorry, there was an error processing your request.";

pub fn fallback_answer(error: &BackendError) -> &'static str {
    if error.is_transport() {
        CONNECTION_FALLBACK
    } else {
        PROCESSING_FALLBACK
    }
}

pub struct GenerationRelay {
    backend: Arc<dyn GenerationBackend>,
    request_timeout: Duration,
    connect_timeout: Duration,
    idle_timeout: Duration,
    event_bus: Arc<EventBus>,
}

impl GenerationRelay {
    pub fn new(backend: Arc<dyn GenerationBackend>, event_bus: Arc<EventBus>) -> Self {
        Self {
            backend,
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            event_bus,
        }
    }

    /// Build with the timeouts from the `[generation]` config section.
    pub fn from_config(
        backend: Arc<dyn GenerationBackend>,
        config: &hnrag_config::GenerationConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(backend, event_bus)
            .with_request_timeout(config.request_timeout())
            .with_connect_timeout(config.connect_timeout())
            .with_idle_timeout(config.stream_idle_timeout())
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Longest wait for the next streamed chunk.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// One batch request; errors are returned as-is.
    pub async fn try_generate(&self, prompt: &str) -> Result<String, BackendError> {
        debug!(backend = self.backend.name(), "Batch generation");
        tokio::time::timeout(self.request_timeout, self.backend.generate(prompt))
            .await
            .map_err(|_| {
                BackendError::Timeout(format!(
                    "no reply within {}s",
                    self.request_timeout.as_secs()
                ))
            })?
    }

    /// Log and publish a batch failure, returning the fallback answer.
    pub fn recover(&self, error: &BackendError) -> &'static str {
        warn!(backend = self.backend.name(), error = %error, "Generation failed, using fallback answer");
        self.event_bus.publish(DomainEvent::GenerationFailed {
            backend: self.backend.name().to_string(),
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
        fallback_answer(error)
    }

    /// Batch generation that always yields answer text.
    pub async fn generate(&self, prompt: &str) -> String {
        match self.try_generate(prompt).await {
            Ok(answer) => answer,
            Err(e) => self.recover(&e).to_string(),
        }
    }

    /// Start a streaming generation. Nothing is sent until the first poll.
    pub fn stream(&self, prompt: impl Into<String>) -> RelayStream {
        RelayStream::new(
            self.backend.clone(),
            prompt.into(),
            self.connect_timeout,
            self.idle_timeout,
        )
    }
}
