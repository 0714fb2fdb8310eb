//! Chunk stage: page concatenation and chunking.

use crate::activities::StageError;
use crate::chunking::split_into_chunks;
use serde::{Deserialize, Serialize};

/// Result of the chunk stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkOutput {
    /// Ordered chunks; position is the dense, zero-based chunk index.
    pub chunks: Vec<String>,
    /// Character count of the concatenated page text.
    pub char_count: usize,
}

/// Joins page texts with a paragraph break and runs the chunking engine.
pub struct ChunkActivity {
    target_size: usize,
    overlap_hint: usize,
}

impl ChunkActivity {
    /// Build an activity with the configured chunk budget.
    pub fn new(target_size: usize, overlap_hint: usize) -> Self {
        Self {
            target_size,
            overlap_hint,
        }
    }

    /// Execute the stage for one document's collected page texts.
    pub async fn run(&self, doc_id: &str, page_texts: &[String]) -> Result<ChunkOutput, StageError> {
        let combined = page_texts.join("\n\n");
        let chunks = split_into_chunks(&combined, self.target_size, self.overlap_hint);
        tracing::info!(
            doc_id,
            pages = page_texts.len(),
            chunks = chunks.len(),
            chars = combined.len(),
            "Document chunked"
        );
        Ok(ChunkOutput {
            chunks,
            char_count: combined.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_are_joined_with_paragraph_breaks() {
        let activity = ChunkActivity::new(1000, 200);
        let pages = vec!["First page text.".to_string(), "Second page text.".to_string()];
        let output = activity.run("doc-1", &pages).await.expect("output");

        assert_eq!(output.chunks.len(), 1);
        assert_eq!(output.chunks[0], "First page text. Second page text.");
        assert_eq!(output.char_count, "First page text.\n\nSecond page text.".len());
    }

    #[tokio::test]
    async fn no_pages_yield_no_chunks() {
        let activity = ChunkActivity::new(1000, 200);
        let output = activity.run("doc-1", &[]).await.expect("output");
        assert!(output.chunks.is_empty());
        assert_eq!(output.char_count, 0);
    }
}
