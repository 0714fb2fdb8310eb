//! OpenAI-compatible embeddings HTTP client.

use crate::config::get_config;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, MAX_EMBED_BATCH};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Batches are capped at [`MAX_EMBED_BATCH`] inputs per call; larger requests
/// are split transparently while preserving input order.
pub struct OpenAiEmbeddingClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) model: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Construct a client from the loaded configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        let base_url = config
            .embedding_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.embedding_api_key.clone(),
            model: config.embedding_model.clone(),
        }
    }

    async fn embed_capped(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let body = json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingClientError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Embedding request failed");
            return Err(error);
        }

        let payload: EmbeddingsResponse = response.json().await?;
        if payload.data.len() != texts.len() {
            return Err(EmbeddingClientError::CountMismatch {
                expected: texts.len(),
                actual: payload.data.len(),
            });
        }

        // The API documents order preservation but also tags each item with
        // its input index; sort to be safe.
        let mut items = payload.data;
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_EMBED_BATCH) {
            let mut produced = self.embed_capped(batch).await?;
            vectors.append(&mut produced);
            tracing::debug!(batch = batch.len(), total = vectors.len(), "Generated embeddings");
        }
        Ok(vectors)
    }
}
