//! Idempotent stage activities executed by the pipeline worker pools.
//!
//! Each activity is a request/response operation keyed by document and stage.
//! Inputs and outputs are serde types so completed results can be journaled
//! and replayed after a restart. Errors carry a retryability class that the
//! orchestrator's retry policy interprets.

mod chunk;
mod embed_index;
mod parse;
mod thumbnail;

pub use chunk::{ChunkActivity, ChunkOutput};
pub use embed_index::{EmbedIndexActivity, EmbedIndexInput, EmbedIndexOutput};
pub use parse::{PageParseActivity, PageParseOutput};
pub use thumbnail::{ThumbnailActivity, ThumbnailOutput};

use crate::embedding::EmbeddingClientError;
use crate::extract::ExtractError;
use crate::qdrant::QdrantError;
use thiserror::Error;

/// The four pipeline stages, each bound to its own worker queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Thumbnail rendering and page discovery.
    Thumbnail,
    /// Per-page text extraction.
    PageParse,
    /// Text chunking.
    Chunk,
    /// Embedding generation and index upsert.
    EmbedIndex,
}

impl StageKind {
    /// Stable lowercase label used in logs and run records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::PageParse => "page_parse",
            Self::Chunk => "chunk",
            Self::EmbedIndex => "embed_index",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retryability classes interpreted by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    /// Malformed or unsupported input; never retried.
    Input,
    /// Transient external failure; retried per policy.
    Transient,
    /// Deterministic mismatch between produced artifacts; retried once.
    DataConsistency,
}

/// Error raised by a stage activity, preserving the causal message verbatim.
#[derive(Debug, Error)]
pub enum StageError {
    /// Non-retryable input problem.
    #[error("{0}")]
    Input(String),
    /// Retryable transient external failure.
    #[error("{0}")]
    Transient(String),
    /// Data consistency violation between pipeline artifacts.
    #[error("{0}")]
    DataConsistency(String),
}

impl StageError {
    /// Classify this error for the retry policy.
    pub fn kind(&self) -> StageErrorKind {
        match self {
            Self::Input(_) => StageErrorKind::Input,
            Self::Transient(_) => StageErrorKind::Transient,
            Self::DataConsistency(_) => StageErrorKind::DataConsistency,
        }
    }
}

impl From<ExtractError> for StageError {
    fn from(error: ExtractError) -> Self {
        match error {
            ExtractError::FileNotFound(_) | ExtractError::UnsupportedType(_) => {
                Self::Input(error.to_string())
            }
            ExtractError::Http(_) | ExtractError::UnexpectedStatus { .. } => {
                Self::Transient(error.to_string())
            }
        }
    }
}

impl From<EmbeddingClientError> for StageError {
    fn from(error: EmbeddingClientError) -> Self {
        match error {
            EmbeddingClientError::CountMismatch { .. } => Self::DataConsistency(error.to_string()),
            _ => Self::Transient(error.to_string()),
        }
    }
}

impl From<QdrantError> for StageError {
    fn from(error: QdrantError) -> Self {
        match error {
            QdrantError::DimensionMismatch { .. } => Self::DataConsistency(error.to_string()),
            _ => Self::Transient(error.to_string()),
        }
    }
}
