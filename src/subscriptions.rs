//! The pipeline's consumers.
//!
//! `new-blocks` is subscribed twice: once to extract and persist the block,
//! once to advance the live cursor. `fetch-historic-data` drives backfill
//! chunks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;

use crate::backfill::BackfillCoordinator;
use crate::bus::{
    AckPolicy, FETCH_HISTORIC_DATA_TOPIC, LocalBus, Message, NEW_BLOCK_TOPIC, WorkItemHandler,
    run_consumer,
};
use crate::extractor::TransferExtractor;
use crate::persistence::PersistenceGateway;
use crate::repository::{CursorStore, HistoricDataProgress};

pub const GET_ASSET_TRANSFERS: &str = "getAssetTransfers";
pub const SET_LAST_ADDED_BLOCK: &str = "setLastAddedBlock";
pub const FETCH_HISTORIC_DATA: &str = "fetchHistoricData";

fn parse_block_number(message: &Message) -> Result<u64> {
    message
        .payload
        .trim()
        .parse()
        .with_context(|| format!("Invalid block number payload {:?}", message.payload))
}

/// Extracts and persists the transfers of one new block.
pub struct AssetTransfersForNewBlock {
    extractor: Arc<TransferExtractor>,
    gateway: PersistenceGateway,
}

impl AssetTransfersForNewBlock {
    pub fn new(extractor: Arc<TransferExtractor>, gateway: PersistenceGateway) -> Self {
        Self { extractor, gateway }
    }
}

#[async_trait]
impl WorkItemHandler for AssetTransfersForNewBlock {
    async fn handle(&self, message: &Message) -> Result<()> {
        let block = parse_block_number(message)?;
        info!("Received new block {} for asset transfers", block);

        let transfers = self.extractor.extract_range(block, block).await?;
        self.gateway.persist_all(&transfers).await?;
        Ok(())
    }
}

/// Advances the live cursor to each dispatched block.
pub struct LastAddedBlockUpdater {
    cursor: Arc<dyn CursorStore>,
}

impl LastAddedBlockUpdater {
    pub fn new(cursor: Arc<dyn CursorStore>) -> Self {
        Self { cursor }
    }
}

#[async_trait]
impl WorkItemHandler for LastAddedBlockUpdater {
    async fn handle(&self, message: &Message) -> Result<()> {
        let block = parse_block_number(message)?;
        info!("Setting last added block to {}", block);
        self.cursor.advance_last_synced_block(block).await
    }
}

/// Processes one backfill chunk per item.
pub struct HistoricDataFetcher {
    coordinator: Arc<BackfillCoordinator>,
}

impl HistoricDataFetcher {
    pub fn new(coordinator: Arc<BackfillCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl WorkItemHandler for HistoricDataFetcher {
    async fn handle(&self, message: &Message) -> Result<()> {
        let progress: HistoricDataProgress = serde_json::from_str(&message.payload)
            .with_context(|| format!("Invalid historic data progress {:?}", message.payload))?;

        self.coordinator.process_chunk(progress).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    pub ack_policy: AckPolicy,
    pub redelivery_delay: Duration,
    pub consumers_per_subscription: usize,
}

/// Subscribe every handler and spawn its consumers onto `tasks`.
pub fn spawn_subscriptions(
    bus: &LocalBus,
    tasks: &mut JoinSet<()>,
    settings: ConsumerSettings,
    extractor: Arc<TransferExtractor>,
    gateway: PersistenceGateway,
    cursor: Arc<dyn CursorStore>,
    coordinator: Arc<BackfillCoordinator>,
) -> Result<()> {
    let handlers: [(&str, &str, Arc<dyn WorkItemHandler>); 3] = [
        (
            NEW_BLOCK_TOPIC,
            GET_ASSET_TRANSFERS,
            Arc::new(AssetTransfersForNewBlock::new(extractor, gateway)),
        ),
        (
            NEW_BLOCK_TOPIC,
            SET_LAST_ADDED_BLOCK,
            Arc::new(LastAddedBlockUpdater::new(cursor)),
        ),
        (
            FETCH_HISTORIC_DATA_TOPIC,
            FETCH_HISTORIC_DATA,
            Arc::new(HistoricDataFetcher::new(coordinator)),
        ),
    ];

    for (topic, subscription, handler) in handlers {
        for _ in 0..settings.consumers_per_subscription.max(1) {
            let consumer = bus.subscribe(topic, subscription)?;
            tasks.spawn(run_consumer(
                consumer,
                handler.clone(),
                settings.ack_policy,
                settings.redelivery_delay,
            ));
        }
    }

    Ok(())
}
