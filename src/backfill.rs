//! Resumable historic backfill.
//!
//! A job walks `[start_block, end_block]` in chunks. Each chunk is one work
//! item on `fetch-historic-data` carrying the job's progress; handling it
//! extracts and persists the chunk, stores the advanced progress and, unless
//! the chunk reached `end_block`, publishes the next item. The progress record
//! stays behind once the job is done and blocks new jobs of the same type
//! until it is cleared.

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::bus::{FETCH_HISTORIC_DATA_TOPIC, MessageBus};
use crate::error::BackfillError;
use crate::extractor::TransferExtractor;
use crate::persistence::{PersistSummary, PersistenceGateway};
use crate::repository::{DataType, HistoricDataProgress, ProgressStore};

pub const DEFAULT_CHUNK_SIZE: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub from_block: u64,
    pub to_block: u64,
    pub persisted: PersistSummary,
    /// Whether a continuation item was published.
    pub continued: bool,
}

pub struct BackfillCoordinator {
    extractor: Arc<TransferExtractor>,
    gateway: PersistenceGateway,
    progress: Arc<dyn ProgressStore>,
    bus: Arc<dyn MessageBus>,
    chunk_size: u64,
}

impl BackfillCoordinator {
    pub fn new(
        extractor: Arc<TransferExtractor>,
        gateway: PersistenceGateway,
        progress: Arc<dyn ProgressStore>,
        bus: Arc<dyn MessageBus>,
        chunk_size: u64,
    ) -> Self {
        Self {
            extractor,
            gateway,
            progress,
            bus,
            chunk_size,
        }
    }

    /// Open a job and dispatch its first chunk.
    ///
    /// Fails with `AlreadyRunning` while any progress record for `data_type`
    /// exists, finished or not.
    pub async fn start(
        &self,
        start_block: u64,
        end_block: u64,
        data_type: DataType,
    ) -> Result<HistoricDataProgress, BackfillError> {
        if start_block == 0 {
            return Err(BackfillError::InvalidRequest(
                "startBlock must be at least 1".to_string(),
            ));
        }
        if end_block < start_block {
            return Err(BackfillError::InvalidRequest(format!(
                "endBlock {end_block} is before startBlock {start_block}"
            )));
        }

        if self.progress.get_progress(data_type).await?.is_some() {
            return Err(BackfillError::AlreadyRunning(data_type));
        }

        let progress = HistoricDataProgress {
            start_block,
            end_block,
            last_fetched_block: start_block - 1,
            data_type,
        };

        self.progress.set_progress(&progress).await?;
        self.dispatch(&progress).await?;

        info!(
            "Started {} backfill for blocks {} to {}",
            data_type, start_block, end_block
        );
        Ok(progress)
    }

    /// Handle one chunk of a running job.
    ///
    /// The stored cursor advances by the full chunk size, so after the last,
    /// clamped chunk it can end up past `end_block`.
    pub async fn process_chunk(
        &self,
        mut progress: HistoricDataProgress,
    ) -> Result<ChunkOutcome, BackfillError> {
        let from_block = progress.last_fetched_block + 1;
        let to_block = (progress.last_fetched_block + self.chunk_size).min(progress.end_block);

        info!(
            "Fetching {} historic data for blocks {} to {}",
            progress.data_type, from_block, to_block
        );

        let transfers = self.extractor.extract_range(from_block, to_block).await?;
        let persisted = self.gateway.persist_all(&transfers).await?;

        progress.last_fetched_block += self.chunk_size;
        self.progress.set_progress(&progress).await?;

        let continued = to_block != progress.end_block;
        if continued {
            self.dispatch(&progress).await?;
        } else {
            info!(
                "{} backfill reached end block {}",
                progress.data_type, progress.end_block
            );
        }

        Ok(ChunkOutcome {
            from_block,
            to_block,
            persisted,
            continued,
        })
    }

    async fn dispatch(&self, progress: &HistoricDataProgress) -> anyhow::Result<()> {
        let payload = serde_json::to_string(progress).context("Failed to serialize progress")?;
        self.bus
            .publish(FETCH_HISTORIC_DATA_TOPIC, payload, None)
            .await
            .context("Failed to publish historic data work item")
    }
}
