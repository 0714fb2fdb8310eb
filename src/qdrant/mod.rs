//! Qdrant vector index integration.

mod client;
mod payload;
mod types;

pub use client::QdrantIndex;
pub use payload::{RESERVED_KEYS, point_id, strip_reserved};
pub use types::{IndexRecord, QdrantError, ScoredMatch};

use async_trait::async_trait;

/// Narrow contract the pipeline and search service depend on.
///
/// Upserts are idempotent by deterministic point id; query results come back
/// in descending-similarity order.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the index if missing; fail fast when an existing index was
    /// created with a different vector dimension.
    async fn ensure_index(
        &self,
        name: &str,
        dimension: u64,
        metric: &str,
    ) -> Result<(), QdrantError>;

    /// Upsert records in sub-batches, returning the number written.
    async fn upsert(&self, name: &str, records: Vec<IndexRecord>) -> Result<usize, QdrantError>;

    /// Query the nearest neighbors of `vector`, payloads included.
    async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, QdrantError>;
}
