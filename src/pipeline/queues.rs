//! Bounded per-stage worker queues.

use crate::activities::StageKind;
use crate::config::QueueCeilings;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One semaphore per stage, sized from the configured ceilings.
///
/// A permit is held only while an attempt executes, never across backoff
/// sleeps, so a retrying stage does not starve the queue.
#[derive(Clone)]
pub struct StageQueues {
    thumbnail: Arc<Semaphore>,
    page_parse: Arc<Semaphore>,
    chunk: Arc<Semaphore>,
    embed_index: Arc<Semaphore>,
}

impl StageQueues {
    /// Build queues from the configured ceilings.
    pub fn from_ceilings(ceilings: QueueCeilings) -> Self {
        Self {
            thumbnail: Arc::new(Semaphore::new(ceilings.thumbnail.max(1))),
            page_parse: Arc::new(Semaphore::new(ceilings.page_parse.max(1))),
            chunk: Arc::new(Semaphore::new(ceilings.chunk.max(1))),
            embed_index: Arc::new(Semaphore::new(ceilings.embed_index.max(1))),
        }
    }

    /// Wait for a slot on the given stage's queue.
    pub async fn acquire(&self, stage: StageKind) -> OwnedSemaphorePermit {
        let semaphore = match stage {
            StageKind::Thumbnail => &self.thumbnail,
            StageKind::PageParse => &self.page_parse,
            StageKind::Chunk => &self.chunk,
            StageKind::EmbedIndex => &self.embed_index,
        };
        semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("stage queue semaphore closed")
    }
}
