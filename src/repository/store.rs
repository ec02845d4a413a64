use anyhow::Result;
use async_trait::async_trait;

use super::database::Database;
use super::models::{AssetTransfer, DataType, HistoricDataProgress};
use super::progress_repository::ProgressRepository;
use super::transfer_repository::TransferRepository;

/// Document store for asset transfers keyed by unique id.
#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn get_transfer(&self, unique_id: &str) -> Result<Option<AssetTransfer>>;

    /// Writes the document unless the key exists. Returns whether it was written.
    async fn insert_transfer_if_absent(&self, transfer: &AssetTransfer) -> Result<bool>;
}

/// The "last synced block" scalar of the live feed.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_last_synced_block(&self) -> Result<Option<u64>>;

    async fn set_last_synced_block(&self, block_number: u64) -> Result<()>;

    async fn advance_last_synced_block(&self, block_number: u64) -> Result<()>;
}

/// Backfill progress, one record per discriminator, overwrite semantics.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_progress(&self, data_type: DataType) -> Result<Option<HistoricDataProgress>>;

    async fn set_progress(&self, progress: &HistoricDataProgress) -> Result<()>;

    async fn clear_progress(&self, data_type: DataType) -> Result<bool>;
}

#[async_trait]
impl TransferStore for Database {
    async fn get_transfer(&self, unique_id: &str) -> Result<Option<AssetTransfer>> {
        let unique_id = unique_id.to_string();
        self.run(move |conn| TransferRepository::new(conn).find_by_unique_id(&unique_id))
            .await
    }

    async fn insert_transfer_if_absent(&self, transfer: &AssetTransfer) -> Result<bool> {
        let transfer = transfer.clone();
        self.run(move |conn| TransferRepository::new(conn).insert(&transfer))
            .await
    }
}

#[async_trait]
impl CursorStore for Database {
    async fn get_last_synced_block(&self) -> Result<Option<u64>> {
        self.run(|conn| ProgressRepository::new(conn).get_last_synced_block())
            .await
    }

    async fn set_last_synced_block(&self, block_number: u64) -> Result<()> {
        self.run(move |conn| ProgressRepository::new(conn).set_last_synced_block(block_number))
            .await
    }

    async fn advance_last_synced_block(&self, block_number: u64) -> Result<()> {
        self.run(move |conn| {
            ProgressRepository::new(conn).advance_last_synced_block(block_number)
        })
        .await
    }
}

#[async_trait]
impl ProgressStore for Database {
    async fn get_progress(&self, data_type: DataType) -> Result<Option<HistoricDataProgress>> {
        self.run(move |conn| ProgressRepository::new(conn).get_progress(data_type))
            .await
    }

    async fn set_progress(&self, progress: &HistoricDataProgress) -> Result<()> {
        let progress = progress.clone();
        self.run(move |conn| ProgressRepository::new(conn).set_progress(&progress))
            .await
    }

    async fn clear_progress(&self, data_type: DataType) -> Result<bool> {
        self.run(move |conn| ProgressRepository::new(conn).clear_progress(data_type))
            .await
    }
}
