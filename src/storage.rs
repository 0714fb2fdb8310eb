//! Local storage for uploaded documents.

use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while persisting uploads.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Persist uploaded bytes under the storage root.
///
/// Files land in a per-upload directory keyed by a fresh UUID so repeated
/// uploads of the same filename never clobber each other. The original
/// filename is kept because the pipeline detects the document kind from its
/// extension.
pub async fn save_upload(
    storage_root: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, StorageError> {
    let safe_name = Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let upload_dir = storage_root
        .join("uploads")
        .join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&upload_dir).await?;

    let path = upload_dir.join(safe_name);
    tokio::fs::write(&path, bytes).await?;
    tracing::info!(path = %path.display(), size = bytes.len(), "Upload stored");
    Ok(path)
}
