//! Hybrid search over indexed chunks.
//!
//! A query is embedded and run against the vector index with an over-fetch,
//! then the candidates pass through a post-filter chain: similarity threshold,
//! required-keyword matching, per-chunk dedup, and the result limit. Filters
//! preserve the index's descending-score order.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::qdrant::{QdrantError, VectorIndex, strip_reserved};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Minimum similarity a candidate must reach when the caller does not set one.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;
/// Default vector/keyword blend weight. Accepted and validated for interface
/// stability; result scoring is currently pure vector similarity.
pub const DEFAULT_HYBRID_ALPHA: f32 = 0.5;
/// Result count when the caller does not set a limit.
pub const DEFAULT_LIMIT: usize = 5;
/// Upper bound on the requested result count.
pub const MAX_LIMIT: usize = 20;
/// Ceiling on the candidate over-fetch from the index.
pub const MAX_OVERFETCH: usize = 100;

/// Errors surfaced by the search service.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query embedding failed.
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index query failed.
    #[error("Index query failed: {0}")]
    Index(#[from] QdrantError),
}

/// A validated search request.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    /// Free-text query to embed.
    pub query: String,
    /// Keywords that must all appear in a chunk, case-insensitively.
    #[serde(default)]
    pub required_keywords: Vec<String>,
    /// Minimum similarity score for a candidate to survive.
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
    /// Vector/keyword blend weight, accepted for interface stability.
    #[serde(default = "default_alpha")]
    pub hybrid_alpha: f32,
    /// Maximum number of results to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_alpha() -> f32 {
    DEFAULT_HYBRID_ALPHA
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl SearchQuery {
    /// Number of candidates to request from the index: three per requested
    /// result so the post-filters have room, capped at [`MAX_OVERFETCH`].
    pub fn overfetch(&self) -> usize {
        (self.limit * 3).min(MAX_OVERFETCH)
    }
}

/// One chunk surviving the post-filter chain.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Similarity score from the index.
    pub score: f32,
    /// Chunk text.
    pub text: String,
    /// Owning document identifier.
    pub doc_id: String,
    /// Chunk position within the document.
    pub chunk_index: u64,
    /// Extension metadata stored with the chunk, reserved keys removed.
    pub metadata: Map<String, Value>,
}

/// Vector search with keyword post-filtering.
pub struct HybridSearchService {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    index_name: String,
}

impl HybridSearchService {
    /// Build a service querying the given index.
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

    /// Execute a search. An empty result set is a normal outcome.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        let vector = self.embedder.embed_one(&query.query).await?;
        let candidates = self
            .index
            .query(&self.index_name, vector, query.overfetch())
            .await?;
        let candidate_count = candidates.len();

        let keywords: Vec<String> = query
            .required_keywords
            .iter()
            .map(|keyword| keyword.to_lowercase())
            .collect();

        let mut seen: HashSet<(String, u64)> = HashSet::new();
        let mut results = Vec::new();
        for candidate in candidates {
            if candidate.score < query.similarity_threshold {
                continue;
            }
            let Some(payload) = candidate.payload else {
                continue;
            };
            let Some((text, doc_id, chunk_index)) = reserved_fields(&payload) else {
                tracing::debug!("Skipping candidate with malformed payload");
                continue;
            };

            if !keywords.is_empty() {
                let haystack = text.to_lowercase();
                if !keywords.iter().all(|keyword| haystack.contains(keyword)) {
                    continue;
                }
            }

            if !seen.insert((doc_id.clone(), chunk_index)) {
                continue;
            }

            results.push(SearchResult {
                score: candidate.score,
                text,
                doc_id,
                chunk_index,
                metadata: strip_reserved(payload),
            });
            if results.len() >= query.limit {
                break;
            }
        }

        tracing::info!(
            candidates = candidate_count,
            results = results.len(),
            keywords = query.required_keywords.len(),
            "Search completed"
        );
        Ok(results)
    }
}

fn reserved_fields(payload: &Map<String, Value>) -> Option<(String, String, u64)> {
    let text = payload.get("text")?.as_str()?.to_string();
    let doc_id = payload.get("doc_id")?.as_str()?.to_string();
    let chunk_index = payload.get("chunk_id")?.as_u64()?;
    Some((text, doc_id, chunk_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalHashClient;
    use crate::qdrant::{IndexRecord, ScoredMatch};
    use async_trait::async_trait;
    use serde_json::json;

    struct CannedIndex {
        matches: Vec<ScoredMatch>,
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
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
            _records: Vec<IndexRecord>,
        ) -> Result<usize, QdrantError> {
            Ok(0)
        }

        async fn query(
            &self,
            _name: &str,
            _vector: Vec<f32>,
            top_k: usize,
        ) -> Result<Vec<ScoredMatch>, QdrantError> {
            Ok(self.matches.iter().take(top_k).cloned().collect())
        }
    }

    fn candidate(score: f32, text: &str, doc_id: &str, chunk_index: u64) -> ScoredMatch {
        let mut payload = Map::new();
        payload.insert("text".into(), json!(text));
        payload.insert("doc_id".into(), json!(doc_id));
        payload.insert("chunk_id".into(), json!(chunk_index));
        payload.insert("char_length".into(), json!(text.len()));
        payload.insert("file_type".into(), json!("pdf"));
        ScoredMatch {
            score,
            payload: Some(payload),
        }
    }

    fn service(matches: Vec<ScoredMatch>) -> HybridSearchService {
        HybridSearchService::new(
            Arc::new(LocalHashClient::new(8)),
            Arc::new(CannedIndex { matches }),
            "docs".into(),
        )
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            query: text.into(),
            required_keywords: Vec::new(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            hybrid_alpha: DEFAULT_HYBRID_ALPHA,
            limit: DEFAULT_LIMIT,
        }
    }

    #[tokio::test]
    async fn threshold_drops_weak_candidates() {
        let service = service(vec![
            candidate(0.95, "strong match", "doc-1", 0),
            candidate(0.60, "weak match", "doc-1", 1),
        ]);
        let results = service.search(&query("anything")).await.expect("results");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "strong match");
    }

    #[tokio::test]
    async fn all_required_keywords_must_match_case_insensitively() {
        let service = service(vec![
            candidate(0.95, "Refund policy for enterprise plans", "doc-1", 0),
            candidate(0.90, "Refund timelines only", "doc-1", 1),
        ]);
        let mut search = query("refunds");
        search.required_keywords = vec!["REFUND".into(), "enterprise".into()];
        let results = service.search(&search).await.expect("results");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn duplicate_chunks_are_deduplicated() {
        let service = service(vec![
            candidate(0.95, "same chunk", "doc-1", 3),
            candidate(0.94, "same chunk", "doc-1", 3),
            candidate(0.93, "other chunk", "doc-2", 3),
        ]);
        let results = service.search(&query("anything")).await.expect("results");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].doc_id, "doc-1");
        assert_eq!(results[1].doc_id, "doc-2");
    }

    #[tokio::test]
    async fn limit_caps_results_in_score_order() {
        let matches = (0..10)
            .map(|i| candidate(0.99 - i as f32 * 0.01, &format!("chunk {i}"), "doc-1", i))
            .collect();
        let service = service(matches);
        let mut search = query("anything");
        search.limit = 3;
        let results = service.search(&search).await.expect("results");
        assert_eq!(results.len(), 3);
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
        assert_eq!(results[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn no_survivors_is_an_empty_result_not_an_error() {
        let service = service(vec![candidate(0.5, "too weak", "doc-1", 0)]);
        let mut search = query("anything");
        search.similarity_threshold = 0.9;
        let results = service.search(&search).await.expect("results");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn malformed_payloads_are_skipped() {
        let mut broken = Map::new();
        broken.insert("text".into(), json!("no ids here"));
        let service = service(vec![
            ScoredMatch {
                score: 0.95,
                payload: Some(broken),
            },
            ScoredMatch {
                score: 0.94,
                payload: None,
            },
            candidate(0.93, "intact", "doc-1", 0),
        ]);
        let results = service.search(&query("anything")).await.expect("results");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "intact");
    }

    #[tokio::test]
    async fn metadata_excludes_reserved_keys() {
        let service = service(vec![candidate(0.95, "chunk", "doc-1", 0)]);
        let results = service.search(&query("anything")).await.expect("results");
        let metadata = &results[0].metadata;
        assert_eq!(metadata.get("file_type"), Some(&json!("pdf")));
        assert!(!metadata.contains_key("text"));
        assert!(!metadata.contains_key("doc_id"));
        assert!(!metadata.contains_key("chunk_id"));
        assert!(!metadata.contains_key("char_length"));
    }

    #[test]
    fn overfetch_scales_with_limit_and_caps() {
        let mut search = SearchQuery {
            query: "q".into(),
            required_keywords: Vec::new(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            hybrid_alpha: DEFAULT_HYBRID_ALPHA,
            limit: 5,
        };
        assert_eq!(search.overfetch(), 15);
        search.limit = 20;
        assert_eq!(search.overfetch(), 60);
        search.limit = 50;
        assert_eq!(search.overfetch(), 100);
    }
}
