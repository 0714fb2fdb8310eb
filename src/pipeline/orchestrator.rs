//! Run orchestration: stage sequencing, fan-out, replay, and cancellation.

use crate::activities::{
    ChunkActivity, ChunkOutput, EmbedIndexActivity, EmbedIndexInput, PageParseActivity,
    PageParseOutput, StageError, StageKind, ThumbnailActivity, ThumbnailOutput,
};
use crate::config::{QueueCeilings, get_config};
use crate::embedding::{EmbeddingClient, MAX_EMBED_BATCH};
use crate::extract::DocumentExtractor;
use crate::metrics::IngestMetrics;
use crate::pipeline::journal::{JournalEntry, JournalError, RunJournal, chunk_digest};
use crate::pipeline::queues::StageQueues;
use crate::pipeline::retry::{RetryPolicy, execute_with_retry};
use crate::pipeline::run::{Document, PipelineRun, RunState, RunSummary};
use crate::qdrant::VectorIndex;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

/// Terminal runs kept queryable before the oldest are evicted.
const DEFAULT_RETAINED_RUNS: usize = 100;

/// Errors surfaced when admitting a document into the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source file does not exist on disk.
    #[error("File not found: {0}")]
    MissingFile(String),
    /// Run admission could not be recorded durably.
    #[error("Journal write failed: {0}")]
    Journal(#[from] JournalError),
}

/// Knobs the orchestrator is built from; production values come from the
/// environment configuration, tests inject their own.
pub struct PipelineSettings {
    /// Vector index the embed stage writes to.
    pub index_name: String,
    /// Root directory for rendered thumbnails.
    pub thumbnail_root: PathBuf,
    /// Target chunk size in characters.
    pub chunk_target_size: usize,
    /// Chunk overlap hint in characters.
    pub chunk_overlap: usize,
    /// Per-stage worker queue ceilings.
    pub queues: QueueCeilings,
    /// Retry policy applied to stage dispatches.
    pub policy: RetryPolicy,
    /// Terminal runs kept queryable before the oldest are evicted.
    pub retained_runs: usize,
}

struct RunEntry {
    run: PipelineRun,
    cancel: Arc<AtomicBool>,
}

/// Live run records plus the retirement order of terminal runs.
#[derive(Default)]
struct RunTable {
    entries: HashMap<String, RunEntry>,
    retired: VecDeque<String>,
}

/// Stage outputs recovered from the journal before execution starts.
#[derive(Default)]
struct ReplayState {
    thumbnail: Option<ThumbnailOutput>,
    pages: HashMap<usize, PageParseOutput>,
    chunk_digest: Option<String>,
    embed_batches: HashSet<usize>,
}

impl ReplayState {
    fn from_entries(entries: Vec<JournalEntry>) -> Self {
        let mut state = Self::default();
        for entry in entries {
            match entry {
                JournalEntry::Started { .. } | JournalEntry::Finished { .. } => {}
                JournalEntry::Thumbnail { output } => state.thumbnail = Some(output),
                JournalEntry::Page { output } => {
                    state.pages.insert(output.page_index, output);
                }
                JournalEntry::Chunk { digest, .. } => {
                    state.chunk_digest = Some(digest);
                    // Batches recorded before a re-chunk are stale.
                    state.embed_batches.clear();
                }
                JournalEntry::EmbedBatch { batch_index, .. } => {
                    state.embed_batches.insert(batch_index);
                }
            }
        }
        state
    }

    fn is_empty(&self) -> bool {
        self.thumbnail.is_none()
            && self.pages.is_empty()
            && self.chunk_digest.is_none()
            && self.embed_batches.is_empty()
    }
}

/// Drives documents through the pipeline stages.
///
/// Runs execute on spawned tasks bounded by a run-level semaphore; stage
/// dispatches additionally pass through the per-stage worker queues.
pub struct Orchestrator {
    thumbnail: ThumbnailActivity,
    parse: PageParseActivity,
    chunker: ChunkActivity,
    embed_index: EmbedIndexActivity,
    queues: StageQueues,
    ceilings: QueueCeilings,
    journal: Arc<dyn RunJournal>,
    policy: RetryPolicy,
    runs: Mutex<RunTable>,
    run_permits: Arc<Semaphore>,
    retained_runs: usize,
    metrics: Arc<IngestMetrics>,
}

impl Orchestrator {
    /// Build an orchestrator from the loaded environment configuration.
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        journal: Arc<dyn RunJournal>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        let config = get_config();
        Self::with_parts(
            extractor,
            embedder,
            index,
            journal,
            metrics,
            PipelineSettings {
                index_name: config.qdrant_index_name.clone(),
                thumbnail_root: Path::new(&config.storage_path).join("thumbnails"),
                chunk_target_size: config.chunk_target_size,
                chunk_overlap: config.chunk_overlap,
                queues: config.queues,
                policy: RetryPolicy::from_settings(config.retry),
                retained_runs: DEFAULT_RETAINED_RUNS,
            },
        )
    }

    /// Build an orchestrator from explicit settings.
    pub fn with_parts(
        extractor: Arc<dyn DocumentExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        journal: Arc<dyn RunJournal>,
        metrics: Arc<IngestMetrics>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            thumbnail: ThumbnailActivity::new(extractor.clone(), settings.thumbnail_root),
            parse: PageParseActivity::new(extractor),
            chunker: ChunkActivity::new(settings.chunk_target_size, settings.chunk_overlap),
            embed_index: EmbedIndexActivity::new(embedder, index, settings.index_name),
            queues: StageQueues::from_ceilings(settings.queues),
            ceilings: settings.queues,
            journal,
            policy: settings.policy,
            runs: Mutex::new(RunTable::default()),
            run_permits: Arc::new(Semaphore::new(settings.queues.runs.max(1))),
            retained_runs: settings.retained_runs.max(1),
            metrics,
        }
    }

    /// Admit a document and spawn its run, returning the run id immediately.
    pub async fn start_run(self: &Arc<Self>, file_path: &str) -> Result<String, PipelineError> {
        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|_| PipelineError::MissingFile(file_path.to_string()))?;

        let file_type = Path::new(file_path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let doc_id = Uuid::new_v4().to_string();
        let run_id = doc_id.clone();
        let document = Document {
            id: doc_id,
            source_path: file_path.to_string(),
            file_type,
            byte_size: metadata.len(),
        };

        // Durable before the run record: a crash after this point leaves a
        // journal a restarted process can re-admit.
        self.journal
            .append(&run_id, &JournalEntry::Started {
                document: document.clone(),
            })
            .await?;

        self.runs.lock().await.entries.insert(
            run_id.clone(),
            RunEntry {
                run: PipelineRun::new(run_id.clone(), document),
                cancel: Arc::new(AtomicBool::new(false)),
            },
        );
        self.spawn_run(run_id.clone());

        tracing::info!(run_id = %run_id, "Pipeline run accepted");
        Ok(run_id)
    }

    /// Re-admit every journaled run without a terminal marker and spawn its
    /// execution, resuming from the recorded stage outputs. Returns the
    /// number of runs resumed. Called once at startup.
    pub async fn resume_incomplete(self: &Arc<Self>) -> Result<usize, JournalError> {
        let mut resumed = 0;
        for run_id in self.journal.list().await? {
            let entries = self.journal.load(&run_id).await?;
            let mut document = None;
            let mut finished = false;
            for entry in &entries {
                match entry {
                    JournalEntry::Started { document: doc } => document = Some(doc.clone()),
                    JournalEntry::Finished { .. } => finished = true,
                    _ => {}
                }
            }
            let Some(document) = document else { continue };
            if finished {
                continue;
            }

            {
                let mut runs = self.runs.lock().await;
                if runs.entries.contains_key(&run_id) {
                    continue;
                }
                runs.entries.insert(
                    run_id.clone(),
                    RunEntry {
                        run: PipelineRun::new(run_id.clone(), document),
                        cancel: Arc::new(AtomicBool::new(false)),
                    },
                );
            }
            tracing::info!(run_id = %run_id, "Resuming interrupted run");
            self.spawn_run(run_id);
            resumed += 1;
        }
        Ok(resumed)
    }

    fn spawn_run(self: &Arc<Self>, run_id: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = this
                .run_permits
                .clone()
                .acquire_owned()
                .await
                .expect("run semaphore closed");
            this.execute(run_id).await;
        });
    }

    /// Snapshot the current state of a run.
    pub async fn run_snapshot(&self, run_id: &str) -> Option<PipelineRun> {
        self.runs
            .lock()
            .await
            .entries
            .get(run_id)
            .map(|entry| entry.run.clone())
    }

    /// Request cancellation of a live run. Returns `false` for unknown or
    /// already-terminal runs.
    pub async fn cancel(&self, run_id: &str) -> bool {
        let runs = self.runs.lock().await;
        match runs.entries.get(run_id) {
            Some(entry) if !matches!(entry.run.state, RunState::Completed | RunState::Failed) => {
                entry.cancel.store(true, Ordering::SeqCst);
                tracing::info!(run_id, "Cancellation requested");
                true
            }
            _ => false,
        }
    }

    pub(crate) async fn execute(self: Arc<Self>, run_id: String) {
        let (document, cancel) = {
            let runs = self.runs.lock().await;
            match runs.entries.get(&run_id) {
                Some(entry) => (entry.run.document.clone(), Arc::clone(&entry.cancel)),
                None => return,
            }
        };

        let result = self.process(&run_id, &document, &cancel).await;
        let status = if result.is_ok() { "success" } else { "error" };
        match result {
            Ok(summary) => {
                self.metrics
                    .record_run_completed(summary.page_count as u64, summary.chunk_count as u64);
                tracing::info!(
                    run_id = %run_id,
                    pages = summary.page_count,
                    chunks = summary.chunk_count,
                    "Pipeline run completed"
                );
                self.update_run(&run_id, |run| {
                    run.state = RunState::Completed;
                    run.summary = Some(summary);
                })
                .await;
            }
            Err(error) => {
                self.metrics.record_run_failed();
                let message = error.to_string();
                tracing::error!(run_id = %run_id, error = %message, "Pipeline run failed");
                self.update_run(&run_id, |run| {
                    run.state = RunState::Failed;
                    run.error = Some(message);
                })
                .await;
            }
        }

        if let Err(error) = self
            .journal
            .append(&run_id, &JournalEntry::Finished {
                status: status.to_string(),
            })
            .await
        {
            tracing::warn!(run_id = %run_id, error = %error, "Failed to journal run completion");
        }
        self.retire(&run_id).await;
    }

    async fn process(
        &self,
        run_id: &str,
        document: &Document,
        cancel: &Arc<AtomicBool>,
    ) -> Result<RunSummary, StageError> {
        let entries = self
            .journal
            .load(run_id)
            .await
            .map_err(|err| StageError::Transient(format!("Journal read failed: {err}")))?;
        let mut replay = ReplayState::from_entries(entries);
        if !replay.is_empty() {
            tracing::info!(run_id, "Replaying journaled stage outputs");
        }

        ensure_live(cancel)?;
        let thumbnail = self.thumbnail_stage(run_id, document, &mut replay).await?;

        ensure_live(cancel)?;
        let page_texts = self
            .page_stage(run_id, document, cancel, thumbnail.page_count, &mut replay)
            .await?;

        ensure_live(cancel)?;
        let chunk_output = self.chunk_stage(run_id, document, &page_texts, &mut replay).await?;

        ensure_live(cancel)?;
        self.embed_stage(run_id, document, cancel, &chunk_output, &replay)
            .await?;

        Ok(RunSummary {
            doc_id: document.id.clone(),
            page_count: thumbnail.page_count,
            chunk_count: chunk_output.chunks.len(),
            thumbnail_paths: thumbnail.thumbnail_paths,
        })
    }

    async fn thumbnail_stage(
        &self,
        run_id: &str,
        document: &Document,
        replay: &mut ReplayState,
    ) -> Result<ThumbnailOutput, StageError> {
        let output = match replay.thumbnail.take() {
            Some(output) => output,
            None => {
                self.update_run(run_id, |run| run.state = RunState::ThumbnailsRequested)
                    .await;
                let mut attempts = 0;
                let result =
                    execute_with_retry(StageKind::Thumbnail, &self.policy, &mut attempts, || async {
                        let _permit = self.queues.acquire(StageKind::Thumbnail).await;
                        self.thumbnail.run(run_id, &document.source_path).await
                    })
                    .await;
                self.update_run(run_id, |run| run.attempts.thumbnail += attempts)
                    .await;
                let output = result?;
                self.append(run_id, &JournalEntry::Thumbnail {
                    output: output.clone(),
                })
                .await?;
                output
            }
        };
        self.update_run(run_id, |run| run.state = RunState::ThumbnailsDone)
            .await;
        Ok(output)
    }

    /// Parse every page not already journaled, then return the surviving page
    /// texts in page order. Pages that yielded no text are dropped here.
    async fn page_stage(
        &self,
        run_id: &str,
        document: &Document,
        cancel: &Arc<AtomicBool>,
        page_count: usize,
        replay: &mut ReplayState,
    ) -> Result<Vec<String>, StageError> {
        let mut pages = std::mem::take(&mut replay.pages);
        let missing: Vec<usize> = (0..page_count)
            .filter(|index| !pages.contains_key(index))
            .collect();

        if !missing.is_empty() {
            self.update_run(run_id, |run| run.state = RunState::PagesRequested)
                .await;
            let source = document.source_path.as_str();
            let parsed: Vec<PageParseOutput> = stream::iter(missing.into_iter().map(|page_index| {
                let cancel = Arc::clone(cancel);
                async move {
                    ensure_live(&cancel)?;
                    let mut attempts = 0;
                    let result = execute_with_retry(
                        StageKind::PageParse,
                        &self.policy,
                        &mut attempts,
                        || async {
                            let _permit = self.queues.acquire(StageKind::PageParse).await;
                            self.parse.run(source, page_index).await
                        },
                    )
                    .await;
                    self.update_run(run_id, |run| run.attempts.page_parse += attempts)
                        .await;
                    let output = result?;
                    self.append(run_id, &JournalEntry::Page {
                        output: output.clone(),
                    })
                    .await?;
                    Ok::<PageParseOutput, StageError>(output)
                }
            }))
            .buffer_unordered(self.ceilings.page_parse.max(1))
            .try_collect()
            .await?;

            for output in parsed {
                pages.insert(output.page_index, output);
            }
        }

        self.update_run(run_id, |run| run.state = RunState::PagesDone)
            .await;

        let mut ordered: Vec<PageParseOutput> = pages.into_values().collect();
        ordered.sort_by_key(|page| page.page_index);
        Ok(ordered.into_iter().filter_map(|page| page.text).collect())
    }

    /// Run the chunk stage. Chunking is deterministic, so it always re-runs;
    /// the resulting digest decides whether journaled embed batches from a
    /// previous execution can be trusted.
    async fn chunk_stage(
        &self,
        run_id: &str,
        document: &Document,
        page_texts: &[String],
        replay: &mut ReplayState,
    ) -> Result<ChunkOutput, StageError> {
        self.update_run(run_id, |run| run.state = RunState::ChunkRequested)
            .await;
        let mut attempts = 0;
        let result = execute_with_retry(StageKind::Chunk, &self.policy, &mut attempts, || async {
            let _permit = self.queues.acquire(StageKind::Chunk).await;
            self.chunker.run(&document.id, page_texts).await
        })
        .await;
        self.update_run(run_id, |run| run.attempts.chunk += attempts)
            .await;
        let output = result?;

        let digest = chunk_digest(&output.chunks);
        if replay.chunk_digest.as_deref() != Some(digest.as_str()) {
            if replay.chunk_digest.is_some() {
                tracing::warn!(
                    run_id,
                    "Journaled chunking no longer matches page content, discarding embed replay"
                );
            }
            replay.embed_batches.clear();
            self.append(run_id, &JournalEntry::Chunk {
                digest,
                output: output.clone(),
            })
            .await?;
        }

        self.update_run(run_id, |run| run.state = RunState::ChunkDone)
            .await;
        Ok(output)
    }

    async fn embed_stage(
        &self,
        run_id: &str,
        document: &Document,
        cancel: &Arc<AtomicBool>,
        chunk_output: &ChunkOutput,
        replay: &ReplayState,
    ) -> Result<(), StageError> {
        self.update_run(run_id, |run| run.state = RunState::EmbedRequested)
            .await;

        let mut metadata = Map::new();
        metadata.insert("file_path".into(), Value::from(document.source_path.clone()));
        metadata.insert("file_type".into(), Value::from(document.file_type.clone()));
        metadata.insert("file_size".into(), Value::from(document.byte_size));
        metadata.insert(
            "chunk_count".into(),
            Value::from(chunk_output.chunks.len() as u64),
        );

        let batches: Vec<EmbedIndexInput> = chunk_output
            .chunks
            .chunks(MAX_EMBED_BATCH)
            .enumerate()
            .filter(|(batch_index, _)| !replay.embed_batches.contains(batch_index))
            .map(|(batch_index, chunks)| EmbedIndexInput {
                doc_id: document.id.clone(),
                batch_index,
                start_chunk_index: batch_index * MAX_EMBED_BATCH,
                chunks: chunks.to_vec(),
                metadata: metadata.clone(),
            })
            .collect();

        stream::iter(batches.into_iter().map(|input| {
            let cancel = Arc::clone(cancel);
            async move {
                ensure_live(&cancel)?;
                let mut attempts = 0;
                let result = execute_with_retry(
                    StageKind::EmbedIndex,
                    &self.policy,
                    &mut attempts,
                    || async {
                        let _permit = self.queues.acquire(StageKind::EmbedIndex).await;
                        self.embed_index.run(&input).await
                    },
                )
                .await;
                self.update_run(run_id, |run| run.attempts.embed_index += attempts)
                    .await;
                let output = result?;
                self.append(run_id, &JournalEntry::EmbedBatch {
                    batch_index: output.batch_index,
                    indexed: output.indexed,
                })
                .await?;
                Ok::<(), StageError>(())
            }
        }))
        .buffer_unordered(self.ceilings.embed_index.max(1))
        .try_collect::<Vec<()>>()
        .await?;

        Ok(())
    }

    async fn append(&self, run_id: &str, entry: &JournalEntry) -> Result<(), StageError> {
        self.journal
            .append(run_id, entry)
            .await
            .map_err(|err| StageError::Transient(format!("Journal write failed: {err}")))
    }

    async fn update_run(&self, run_id: &str, apply: impl FnOnce(&mut PipelineRun)) {
        if let Some(entry) = self.runs.lock().await.entries.get_mut(run_id) {
            apply(&mut entry.run);
        }
    }

    /// Record a terminal run in retirement order; the oldest retired runs
    /// beyond the retention cap are dropped from the table.
    async fn retire(&self, run_id: &str) {
        let mut runs = self.runs.lock().await;
        runs.retired.push_back(run_id.to_string());
        while runs.retired.len() > self.retained_runs {
            if let Some(evicted) = runs.retired.pop_front() {
                runs.entries.remove(&evicted);
                tracing::debug!(run_id = %evicted, "Evicted retired run record");
            }
        }
    }
}

fn ensure_live(cancel: &AtomicBool) -> Result<(), StageError> {
    if cancel.load(Ordering::SeqCst) {
        Err(StageError::Input("Run cancelled".into()))
    } else {
        Ok(())
    }
}
