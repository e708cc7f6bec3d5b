/// Remote embeddings through the OpenAI `/v1/embeddings` endpoint.
///
/// One HTTP client is built when the provider is selected and reused for
/// every call. Each batch is a single request; there are no retries.
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Embedder, EmbedderError, ProviderKind, l2_normalize};

pub const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimensions: usize,
    endpoint: String,
}

impl OpenAiEmbedder {
    /// Build the embedder and its long-lived HTTP client.
    pub fn new(api_key: String, model: String, dimensions: usize) -> Result<Self, EmbedderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbedderError::RequestFailed(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            dimensions,
            endpoint: OPENAI_EMBEDDINGS_URL.to_string(),
        })
    }

    /// Point the embedder at a compatible endpoint (proxies, local gateways).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Decode a response body into vectors ordered by their `index` field,
/// normalized to unit length.
fn parse_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>, EmbedderError> {
    let mut response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbedderError::RequestFailed(format!("invalid response: {e}")))?;

    if response.data.len() != expected {
        return Err(EmbedderError::CountMismatch {
            expected,
            got: response.data.len(),
        });
    }

    response.data.sort_by_key(|d| d.index);
    Ok(response
        .data
        .into_iter()
        .map(|d| {
            let mut v = d.embedding;
            l2_normalize(&mut v);
            v
        })
        .collect())
}

impl Embedder for OpenAiEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("requesting {} embeddings from {}", texts.len(), self.model);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| EmbedderError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| EmbedderError::RequestFailed(format!("read body: {e}")))?;
        if !status.is_success() {
            return Err(EmbedderError::RequestFailed(format!(
                "OpenAI API error {status}: {text}"
            )));
        }

        parse_response(&text, texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }
}
