//! Page-parse stage: per-page text extraction.

use crate::activities::StageError;
use crate::extract::DocumentExtractor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of parsing one page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageParseOutput {
    /// Zero-based page index within the document.
    pub page_index: usize,
    /// Extracted text; `None` when the page yielded no text. That outcome is
    /// a valid result, not an error.
    pub text: Option<String>,
}

/// Extracts the text of a single page through the extraction boundary.
pub struct PageParseActivity {
    extractor: Arc<dyn DocumentExtractor>,
}

impl PageParseActivity {
    /// Build an activity backed by the given extractor.
    pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { extractor }
    }

    /// Execute the stage for one page.
    pub async fn run(
        &self,
        source_path: &str,
        page_index: usize,
    ) -> Result<PageParseOutput, StageError> {
        let text = self.extractor.extract_page(source_path, page_index).await?;
        if text.is_none() {
            tracing::debug!(source_path, page_index, "Page yielded no text");
        }
        Ok(PageParseOutput { page_index, text })
    }
}
