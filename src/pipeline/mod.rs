//! Durable document-processing pipeline.
//!
//! A run moves a document through four stages (thumbnail, page parse, chunk,
//! embed-and-index), each dispatched through a bounded worker queue with retry
//! classification. Completed stage outputs are journaled so an interrupted run
//! can be replayed without redoing finished work; runs whose journal lacks a
//! terminal marker are re-admitted at startup.

mod journal;
mod orchestrator;
mod queues;
mod retry;
mod run;

pub use journal::{FileJournal, JournalEntry, JournalError, MemoryJournal, RunJournal, chunk_digest};
pub use orchestrator::{Orchestrator, PipelineError, PipelineSettings};
pub use queues::StageQueues;
pub use retry::{RetryPolicy, execute_with_retry};
pub use run::{Document, PipelineRun, RunState, RunSummary, StageAttempts};
