//! Run records tracked by the orchestrator.

use serde::{Deserialize, Serialize};

/// A document admitted into the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier, shared with the vector index payloads.
    pub id: String,
    /// Filesystem path of the source file.
    pub source_path: String,
    /// Lowercased file extension, e.g. `pdf`.
    pub file_type: String,
    /// Size of the source file in bytes.
    pub byte_size: u64,
}

/// Lifecycle states of a pipeline run.
///
/// `*Requested` states mark that a stage has been dispatched; the matching
/// `*Done` state is recorded only after the stage output is journaled, so a
/// restart re-enters the stage rather than trusting a partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run accepted, nothing dispatched yet.
    Created,
    /// Thumbnail stage dispatched.
    ThumbnailsRequested,
    /// Thumbnail stage completed and journaled.
    ThumbnailsDone,
    /// Page-parse fan-out dispatched.
    PagesRequested,
    /// All pages parsed and journaled.
    PagesDone,
    /// Chunk stage dispatched.
    ChunkRequested,
    /// Chunk stage completed and journaled.
    ChunkDone,
    /// Embed-and-index fan-out dispatched.
    EmbedRequested,
    /// Every stage finished; summary available.
    Completed,
    /// Run gave up; error message available.
    Failed,
}

impl RunState {
    /// Coarse status label exposed at the HTTP boundary.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed => "success",
            Self::Failed => "error",
            _ => "running",
        }
    }
}

/// Attempt counters per stage, reported in run snapshots.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageAttempts {
    /// Attempts consumed by the thumbnail stage.
    pub thumbnail: u32,
    /// Attempts consumed across page-parse dispatches.
    pub page_parse: u32,
    /// Attempts consumed by the chunk stage.
    pub chunk: u32,
    /// Attempts consumed across embed-and-index dispatches.
    pub embed_index: u32,
}

/// Final artifact counts for a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Document identifier the run processed.
    pub doc_id: String,
    /// Pages discovered in the source document.
    pub page_count: usize,
    /// Chunks written to the vector index.
    pub chunk_count: usize,
    /// Thumbnail paths, one per page.
    pub thumbnail_paths: Vec<String>,
}

/// Snapshot of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier, also used as the journal key.
    pub run_id: String,
    /// Document being processed.
    pub document: Document,
    /// Current lifecycle state.
    pub state: RunState,
    /// Attempt counters per stage.
    pub attempts: StageAttempts,
    /// Failure message, verbatim from the failing stage, when `state` is
    /// [`RunState::Failed`].
    pub error: Option<String>,
    /// Artifact summary, present once `state` is [`RunState::Completed`].
    pub summary: Option<RunSummary>,
}

impl PipelineRun {
    /// Create a fresh run record in the [`RunState::Created`] state.
    pub fn new(run_id: String, document: Document) -> Self {
        Self {
            run_id,
            document,
            state: RunState::Created,
            attempts: StageAttempts::default(),
            error: None,
            summary: None,
        }
    }
}
