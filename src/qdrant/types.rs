//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Existing index dimension does not match the configured embedding size.
    #[error("Index dimension mismatch: index has {index}, embeddings produce {configured}")]
    DimensionMismatch {
        /// Vector size the index was created with.
        index: u64,
        /// Vector size the configured embedding model produces.
        configured: u64,
    },
    /// Bootstrap attempts were exhausted without a ready index.
    #[error("Vector index not ready after {attempts} attempts: {last_error}")]
    BootstrapExhausted {
        /// Number of connection attempts made.
        attempts: u32,
        /// Message of the last failure observed.
        last_error: String,
    },
}

/// One chunk prepared for indexing: text, vector, and extension metadata.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    /// Owning document identifier.
    pub doc_id: String,
    /// Dense, zero-based chunk position within the document.
    pub chunk_index: usize,
    /// Raw chunk text.
    pub text: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
    /// Document-level extension metadata merged into the payload. Reserved
    /// keys (`text`, `doc_id`, `chunk_id`) always win on collision.
    pub metadata: Map<String, Value>,
}

/// Scored match returned by similarity queries, in descending-score order.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    /// Similarity score computed by the index.
    pub score: f32,
    /// Payload stored alongside the vector, when requested.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfoResult,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResult {
    pub(crate) config: CollectionConfig,
}

#[derive(Deserialize)]
pub(crate) struct CollectionConfig {
    pub(crate) params: CollectionParams,
}

#[derive(Deserialize)]
pub(crate) struct CollectionParams {
    pub(crate) vectors: VectorParams,
}

#[derive(Deserialize)]
pub(crate) struct VectorParams {
    pub(crate) size: u64,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
