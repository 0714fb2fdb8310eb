use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct IngestMetrics {
    documents_ingested: AtomicU64,
    pages_parsed: AtomicU64,
    chunks_indexed: AtomicU64,
    runs_failed: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run with its page and chunk counts.
    pub fn record_run_completed(&self, page_count: u64, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.pages_parsed.fetch_add(page_count, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a run that reached the failed terminal state.
    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            pages_parsed: self.pages_parsed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents fully processed since startup.
    pub documents_ingested: u64,
    /// Total page count parsed across all completed runs.
    pub pages_parsed: u64,
    /// Total chunk count written to the vector index.
    pub chunks_indexed: u64,
    /// Number of runs that ended in the failed state.
    pub runs_failed: u64,
}
