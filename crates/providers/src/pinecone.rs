//! Pinecone-compatible vector index over its REST data plane.

use std::time::Duration;

use async_trait::async_trait;
use hnrag_core::backend::{
    IndexMatch, IndexQuery, IndexQueryResponse, IndexRecord, IndexUpsertRequest,
    IndexUpsertResponse, VectorIndex,
};
use hnrag_core::error::BackendError;
use tracing::debug;

use crate::ollama::{http_client, status_error, transport_error};

/// Vectors per upsert request.
const UPSERT_BATCH: usize = 100;

pub struct PineconeIndex {
    api_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl PineconeIndex {
    pub fn new(
        api_url: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            api_url: api_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
            timeout,
            client: http_client(timeout)?,
        })
    }

    /// Build from the `[index]` config section.
    pub fn from_config(config: &hnrag_config::IndexConfig) -> Result<Self, BackendError> {
        Self::new(config.api_url.clone(), config.api_key.clone(), config.timeout())
    }

    fn endpoint(&self, path: &str) -> Result<String, BackendError> {
        let base = self
            .api_url
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("index.api_url is not set".into()))?;
        Ok(format!("{base}{path}"))
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("Api-Key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, BackendError> {
        let url = self.endpoint("/query")?;
        let body = IndexQuery {
            vector: vector.to_vec(),
            top_k,
            include_metadata: true,
        };

        debug!(top_k, dims = vector.len(), "Querying vector index");

        let response = self
            .request(url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        parse_query_response(&bytes)
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize, BackendError> {
        let url = self.endpoint("/vectors/upsert")?;
        let mut written = 0;

        for batch in records.chunks(UPSERT_BATCH) {
            let body = IndexUpsertRequest {
                vectors: batch.to_vec(),
            };
            let response = self
                .request(url.clone())
                .json(&body)
                .send()
                .await
                .map_err(transport_error)?;

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let parsed: IndexUpsertResponse = response.json().await.map_err(|e| {
                BackendError::MalformedResponse(format!("Failed to parse upsert response: {e}"))
            })?;
            written += parsed.upserted_count;
        }

        debug!(written, "Upserted vectors");
        Ok(written)
    }
}

fn parse_query_response(bytes: &[u8]) -> Result<Vec<IndexMatch>, BackendError> {
    serde_json::from_slice::<IndexQueryResponse>(bytes)
        .map(|r| r.matches)
        .map_err(|e| BackendError::MalformedResponse(format!("Failed to parse query response: {e}")))
}
