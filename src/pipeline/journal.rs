//! Append-only run journal for crash replay.
//!
//! Each run's journal opens with an admission entry carrying the document
//! record and closes with a terminal marker; every completed stage output in
//! between is one JSON line. On restart the orchestrator re-admits runs whose
//! journal lacks the terminal marker, skips every stage whose output is
//! already recorded, and re-enters the pipeline at the first gap.

use crate::activities::{ChunkOutput, PageParseOutput, ThumbnailOutput};
use crate::pipeline::run::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Errors raised by journal backends.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Filesystem access failed.
    #[error("Journal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// An entry could not be serialized or deserialized.
    #[error("Journal entry malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One journaled stage completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum JournalEntry {
    /// Run admitted; recorded before any stage executes so a restarted
    /// process can rebuild the run record.
    Started {
        /// Document under ingestion.
        document: Document,
    },
    /// Run reached a terminal state; runs without this marker are resumed at
    /// startup.
    Finished {
        /// Coarse outcome label, `success` or `error`.
        status: String,
    },
    /// Thumbnail stage finished.
    Thumbnail {
        /// Recorded stage output.
        output: ThumbnailOutput,
    },
    /// One page was parsed.
    Page {
        /// Recorded stage output.
        output: PageParseOutput,
    },
    /// Chunk stage finished.
    Chunk {
        /// Digest of the produced chunks, checked on replay so embed batches
        /// recorded against different chunking are not trusted.
        digest: String,
        /// Recorded stage output.
        output: ChunkOutput,
    },
    /// One embed-and-index batch finished.
    EmbedBatch {
        /// Batch position within the fan-out.
        batch_index: usize,
        /// Records written by the batch.
        indexed: usize,
    },
}

/// Content digest binding embed-batch entries to a specific chunking.
pub fn chunk_digest(chunks: &[String]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.len().to_le_bytes());
        hasher.update(chunk.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Persistence contract for run journals.
#[async_trait]
pub trait RunJournal: Send + Sync {
    /// Append one entry for the given run.
    async fn append(&self, run_id: &str, entry: &JournalEntry) -> Result<(), JournalError>;

    /// Load all entries recorded for the given run, oldest first. A run with
    /// no journal yields an empty list.
    async fn load(&self, run_id: &str) -> Result<Vec<JournalEntry>, JournalError>;

    /// Ids of every run with at least one journaled entry.
    async fn list(&self) -> Result<Vec<String>, JournalError>;
}

/// JSONL journal stored at `<root>/<run_id>.jsonl`.
pub struct FileJournal {
    root: PathBuf,
}

impl FileJournal {
    /// Build a journal rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("{run_id}.jsonl"))
    }
}

#[async_trait]
impl RunJournal for FileJournal {
    async fn append(&self, run_id: &str, entry: &JournalEntry) -> Result<(), JournalError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_path(run_id))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let contents = match tokio::fs::read_to_string(self.run_path(run_id)).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    async fn list(&self) -> Result<Vec<String>, JournalError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut run_ids = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("jsonl")
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                run_ids.push(stem.to_string());
            }
        }
        Ok(run_ids)
    }
}

/// In-memory journal for tests.
#[derive(Default)]
pub struct MemoryJournal {
    entries: Mutex<HashMap<String, Vec<JournalEntry>>>,
}

#[async_trait]
impl RunJournal for MemoryJournal {
    async fn append(&self, run_id: &str, entry: &JournalEntry) -> Result<(), JournalError> {
        self.entries
            .lock()
            .await
            .entry(run_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Vec<JournalEntry>, JournalError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list(&self) -> Result<Vec<String>, JournalError> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}
