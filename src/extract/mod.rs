//! Text-extraction boundary.
//!
//! Concrete PDF/Word/OCR backends live behind an external extraction service;
//! the pipeline only depends on the narrow [`DocumentExtractor`] contract.
//! Extraction yielding no text is a soft outcome (`Ok(None)`); a missing file
//! or an unsupported extension is a hard error that fails the run without
//! retrying.

mod http;

pub use http::HttpExtractor;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors raised at the extraction boundary.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Source file does not exist on disk.
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// File extension is not one of the supported document kinds.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    /// HTTP layer failed before receiving a response.
    #[error("Extraction request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Extraction service responded with an unexpected status code.
    #[error("Unexpected extractor response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the extraction service.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Document kinds the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// PDF document.
    Pdf,
    /// Word document (`.doc`/`.docx`).
    Word,
    /// Raster image processed through OCR.
    Image,
}

impl FileKind {
    /// Detect the file kind from a path extension.
    ///
    /// Returns [`ExtractError::UnsupportedType`] for anything outside the
    /// supported set.
    pub fn from_path(path: &str) -> Result<Self, ExtractError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "doc" | "docx" => Ok(Self::Word),
            "jpg" | "jpeg" | "png" | "tiff" | "bmp" => Ok(Self::Image),
            _ => Err(ExtractError::UnsupportedType(path.to_string())),
        }
    }

    /// Stable lowercase label used in payload metadata and requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Image => "image",
        }
    }
}

/// Interface implemented by text-extraction backends.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Number of pages in the document (images count as a single page).
    async fn page_count(&self, path: &str) -> Result<usize, ExtractError>;

    /// Extract the text of one page; `Ok(None)` signals the page yielded no text.
    async fn extract_page(&self, path: &str, page_index: usize)
    -> Result<Option<String>, ExtractError>;

    /// Render a PNG thumbnail for one page, returning the encoded bytes.
    async fn render_thumbnail(&self, path: &str, page_index: usize)
    -> Result<Vec<u8>, ExtractError>;
}
