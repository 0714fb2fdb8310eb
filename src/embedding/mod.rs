//! Embedding client abstraction and adapters.

mod openai;

pub use openai::OpenAiEmbeddingClient;

use crate::config::{EmbeddingProvider, get_config};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Maximum number of inputs submitted to the provider in one call.
pub const MAX_EMBED_BATCH: usize = 100;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// HTTP layer failed before receiving a response.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected embedding response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch {
        /// Number of input texts submitted.
        expected: usize,
        /// Number of vectors returned by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
///
/// Implementations must preserve input order and return exactly one vector per
/// input text.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Produce an embedding vector for a single query text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingClientError::GenerationFailed("provider returned no vectors".into()))
    }
}

/// Deterministic local embedding client for development and tests.
///
/// Hashes byte content into a fixed-dimension normalized vector so that
/// identical texts always embed identically without any network dependency.
pub struct LocalHashClient {
    dimension: usize,
}

impl LocalHashClient {
    /// Construct a client producing vectors of the given dimension.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        if text.is_empty() || self.dimension == 0 {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for LocalHashClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client() -> Arc<dyn EmbeddingClient> {
    let config = get_config();
    match config.embedding_provider {
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::from_config()),
        EmbeddingProvider::Local => Arc::new(LocalHashClient::new(config.embedding_dimension)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_client_is_deterministic_and_normalized() {
        let client = LocalHashClient::new(32);
        let texts = vec!["alpha".to_string(), "alpha".to_string(), "beta".to_string()];
        let vectors = client.embed_batch(&texts).await.expect("vectors");

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[1]);
        assert_ne!(vectors[0], vectors[2]);
        for vector in &vectors {
            assert_eq!(vector.len(), 32);
            let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn local_client_rejects_empty_input() {
        let client = LocalHashClient::new(8);
        assert!(client.embed_batch(&[]).await.is_err());
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let client = LocalHashClient::new(16);
        let vector = client.embed_one("query text").await.expect("vector");
        assert_eq!(vector.len(), 16);
    }
}
