//! Embed-and-index stage: batch embedding and idempotent index upserts.

use crate::activities::StageError;
use crate::embedding::{EmbeddingClient, MAX_EMBED_BATCH};
use crate::qdrant::{IndexRecord, VectorIndex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One bounded batch of chunks to embed and upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedIndexInput {
    /// Owning document identifier.
    pub doc_id: String,
    /// Batch position within the fan-out, for journaling and logs.
    pub batch_index: usize,
    /// Chunk index of the first chunk in this batch.
    pub start_chunk_index: usize,
    /// Chunk texts, at most [`MAX_EMBED_BATCH`] of them.
    pub chunks: Vec<String>,
    /// Document-level extension metadata merged into each payload.
    pub metadata: Map<String, Value>,
}

/// Result of embedding and upserting one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedIndexOutput {
    /// Batch position within the fan-out.
    pub batch_index: usize,
    /// Number of records written to the index.
    pub indexed: usize,
}

/// Embeds a chunk batch with one provider call and upserts the records.
///
/// Idempotent: record ids are deterministic, so re-running a batch overwrites
/// the same points instead of duplicating them.
pub struct EmbedIndexActivity {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    index_name: String,
}

impl EmbedIndexActivity {
    /// Build an activity targeting the given index.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        index_name: String,
    ) -> Self {
        Self {
            embedder,
            index,
            index_name,
        }
    }

    /// Execute the stage for one chunk batch.
    pub async fn run(&self, input: &EmbedIndexInput) -> Result<EmbedIndexOutput, StageError> {
        if input.chunks.is_empty() {
            return Ok(EmbedIndexOutput {
                batch_index: input.batch_index,
                indexed: 0,
            });
        }
        if input.chunks.len() > MAX_EMBED_BATCH {
            return Err(StageError::Input(format!(
                "Embed batch of {} exceeds the {MAX_EMBED_BATCH}-chunk bound",
                input.chunks.len()
            )));
        }

        let vectors = self.embedder.embed_batch(&input.chunks).await?;
        if vectors.len() != input.chunks.len() {
            return Err(StageError::DataConsistency(format!(
                "Embedding count mismatch: expected {}, got {}",
                input.chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<IndexRecord> = input
            .chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(offset, (text, vector))| IndexRecord {
                doc_id: input.doc_id.clone(),
                chunk_index: input.start_chunk_index + offset,
                text: text.clone(),
                vector,
                metadata: input.metadata.clone(),
            })
            .collect();

        let indexed = self.index.upsert(&self.index_name, records).await?;
        tracing::info!(
            doc_id = %input.doc_id,
            batch = input.batch_index,
            indexed,
            "Chunk batch embedded and indexed"
        );
        Ok(EmbedIndexOutput {
            batch_index: input.batch_index,
            indexed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClientError, LocalHashClient};
    use crate::qdrant::{QdrantError, ScoredMatch, point_id};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Id-keyed fake index so repeated upserts model overwrite semantics.
    #[derive(Default)]
    struct RecordingIndex {
        points: Mutex<HashMap<String, IndexRecord>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn ensure_index(
            &self,
            _name: &str,
            _dimension: u64,
            _metric: &str,
        ) -> Result<(), QdrantError> {
            Ok(())
        }

        async fn upsert(
            &self,
            _name: &str,
            records: Vec<IndexRecord>,
        ) -> Result<usize, QdrantError> {
            let mut points = self.points.lock().await;
            let written = records.len();
            for record in records {
                points.insert(point_id(&record.doc_id, record.chunk_index), record);
            }
            Ok(written)
        }

        async fn query(
            &self,
            _name: &str,
            _vector: Vec<f32>,
            _top_k: usize,
        ) -> Result<Vec<ScoredMatch>, QdrantError> {
            Ok(Vec::new())
        }
    }

    struct MiscountingEmbedder;

    #[async_trait]
    impl EmbeddingClient for MiscountingEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::CountMismatch {
                expected: texts.len(),
                actual: texts.len().saturating_sub(1),
            })
        }
    }

    fn input(doc_id: &str, chunks: Vec<String>) -> EmbedIndexInput {
        EmbedIndexInput {
            doc_id: doc_id.into(),
            batch_index: 0,
            start_chunk_index: 0,
            chunks,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn re_running_a_batch_does_not_duplicate_points() {
        let index = Arc::new(RecordingIndex::default());
        let activity = EmbedIndexActivity::new(
            Arc::new(LocalHashClient::new(16)),
            index.clone(),
            "docs".into(),
        );

        let batch = input("doc-1", vec!["alpha".into(), "beta".into()]);
        activity.run(&batch).await.expect("first run");
        activity.run(&batch).await.expect("second run");

        let points = index.points.lock().await;
        assert_eq!(points.len(), 2);
    }

    #[tokio::test]
    async fn chunk_indices_continue_from_batch_offset() {
        let index = Arc::new(RecordingIndex::default());
        let activity = EmbedIndexActivity::new(
            Arc::new(LocalHashClient::new(16)),
            index.clone(),
            "docs".into(),
        );

        let batch = EmbedIndexInput {
            start_chunk_index: 100,
            batch_index: 1,
            ..input("doc-1", vec!["later chunk".into()])
        };
        activity.run(&batch).await.expect("run");

        let points = index.points.lock().await;
        assert!(points.contains_key(&point_id("doc-1", 100)));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_as_input_error() {
        let activity = EmbedIndexActivity::new(
            Arc::new(LocalHashClient::new(16)),
            Arc::new(RecordingIndex::default()),
            "docs".into(),
        );
        let chunks: Vec<String> = (0..101).map(|i| format!("chunk {i}")).collect();
        let error = activity.run(&input("doc-1", chunks)).await.unwrap_err();
        assert!(matches!(error, StageError::Input(_)));
    }

    #[tokio::test]
    async fn count_mismatch_surfaces_as_data_consistency() {
        let activity = EmbedIndexActivity::new(
            Arc::new(MiscountingEmbedder),
            Arc::new(RecordingIndex::default()),
            "docs".into(),
        );
        let error = activity
            .run(&input("doc-1", vec!["alpha".into(), "beta".into()]))
            .await
            .unwrap_err();
        assert!(matches!(error, StageError::DataConsistency(_)));
    }
}
