//! Thumbnail stage: page discovery and per-page thumbnail rendering.

use crate::activities::StageError;
use crate::extract::{DocumentExtractor, FileKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Result of the thumbnail stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailOutput {
    /// Number of pages discovered in the source document.
    pub page_count: usize,
    /// Written thumbnail paths, one per page, in page order.
    pub thumbnail_paths: Vec<String>,
}

/// Renders one thumbnail per page under `<root>/<run_id>/page_<n>.png`.
///
/// Idempotent: re-running overwrites the same files.
pub struct ThumbnailActivity {
    extractor: Arc<dyn DocumentExtractor>,
    thumbnail_root: PathBuf,
}

impl ThumbnailActivity {
    /// Build an activity writing thumbnails under the given root directory.
    pub fn new(extractor: Arc<dyn DocumentExtractor>, thumbnail_root: PathBuf) -> Self {
        Self {
            extractor,
            thumbnail_root,
        }
    }

    /// Execute the stage for one document.
    pub async fn run(&self, run_id: &str, source_path: &str) -> Result<ThumbnailOutput, StageError> {
        if tokio::fs::metadata(source_path).await.is_err() {
            return Err(StageError::Input(format!("File not found: {source_path}")));
        }
        FileKind::from_path(source_path)?;

        let page_count = self.extractor.page_count(source_path).await?;
        let run_dir = self.thumbnail_root.join(run_id);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|err| StageError::Transient(format!("Failed to create {run_dir:?}: {err}")))?;

        let mut thumbnail_paths = Vec::with_capacity(page_count);
        for page_index in 0..page_count {
            let bytes = self.extractor.render_thumbnail(source_path, page_index).await?;
            let path = run_dir.join(format!("page_{}.png", page_index + 1));
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|err| StageError::Transient(format!("Failed to write {path:?}: {err}")))?;
            thumbnail_paths.push(path.to_string_lossy().into_owned());
        }

        tracing::info!(run_id, page_count, "Thumbnails generated");
        Ok(ThumbnailOutput {
            page_count,
            thumbnail_paths,
        })
    }
}
