//! Ollama backends: text generation and embeddings.
//!
//! Generation uses `POST /api/generate`. With `stream: false` the reply is a
//! single JSON object; with `stream: true` it is newline-delimited JSON
//! records delivered in arbitrary chunks. This client does not decode the
//! stream. It forwards raw chunks and leaves framing to the relay.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use hnrag_core::backend::{
    ChunkReceiver, Embedder, EmbeddingRequest, EmbeddingResponse, GenerateRequest,
    GenerateResponse, GenerationBackend,
};
use hnrag_core::error::BackendError;
use tracing::{debug, warn};

/// Map a reqwest failure into our transport taxonomy.
pub(crate) fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

/// Build the shared HTTP client.
pub(crate) fn http_client(connect_timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| BackendError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Turn a non-success response into an `ApiError`.
pub(crate) async fn status_error(response: reqwest::Response) -> BackendError {
    let status_code = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    warn!(status = status_code, body = %message, "Backend returned error");
    BackendError::ApiError {
        status_code,
        message,
    }
}

/// Text generation through Ollama.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            request_timeout,
            client: http_client(connect_timeout)?,
        })
    }

    /// Build from the `[generation]` config section.
    pub fn from_config(config: &hnrag_config::GenerationConfig) -> Result<Self, BackendError> {
        Self::new(
            &config.base_url,
            &config.model,
            config.connect_timeout(),
            config.request_timeout(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn body(&self, prompt: &str, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream,
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending generation request");

        let response = self
            .client
            .post(self.url())
            .timeout(self.request_timeout)
            .json(&self.body(prompt, false))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        parse_generate_response(&bytes)
    }

    async fn stream(&self, prompt: &str) -> Result<ChunkReceiver, BackendError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending streaming request");

        // No overall timeout: the relay bounds the wait for each chunk instead.
        let response = self
            .client
            .post(self.url())
            .json(&self.body(prompt, true))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Stop as soon as the receiver is dropped, even while the backend is silent.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            loop {
                let chunk = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Stream receiver dropped, closing backend connection");
                        return;
                    }
                    chunk = byte_stream.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    return;
                };
                let item = chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| BackendError::StreamInterrupted(e.to_string()));
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("Stream receiver dropped, closing backend connection");
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

/// Parse a complete `{ "response": "..." }` body.
fn parse_generate_response(bytes: &[u8]) -> Result<String, BackendError> {
    serde_json::from_slice::<GenerateResponse>(bytes)
        .map(|r| r.response)
        .map_err(|e| BackendError::MalformedResponse(format!("Failed to parse response: {e}")))
}

/// Embeddings through Ollama (`POST /api/embeddings`).
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
            client: http_client(timeout)?,
        })
    }

    /// Build from the `[embedding]` config section.
    pub fn from_config(config: &hnrag_config::EmbeddingConfig) -> Result<Self, BackendError> {
        Self::new(&config.base_url, &config.model, config.timeout())
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        debug!(model = %self.model, chars = text.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            BackendError::MalformedResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(parsed.embedding)
    }
}
