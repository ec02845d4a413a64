use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::repository::{AssetTransfer, TransferStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Idempotent writer for asset transfers.
///
/// Each transfer is looked up by unique id first and only written when
/// absent. Existing documents are never overwritten.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn TransferStore>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    pub async fn persist(&self, transfer: &AssetTransfer) -> Result<PersistOutcome> {
        if self.store.get_transfer(&transfer.unique_id).await?.is_some() {
            info!(unique_id = %transfer.unique_id, "Found duplicate asset transfer, skipping");
            return Ok(PersistOutcome::Duplicate);
        }

        // another producer may have written the key since the lookup
        if !self.store.insert_transfer_if_absent(transfer).await? {
            info!(
                unique_id = %transfer.unique_id,
                "Asset transfer written concurrently, skipping"
            );
            return Ok(PersistOutcome::Duplicate);
        }

        Ok(PersistOutcome::Inserted)
    }

    /// Persists one at a time, in order.
    pub async fn persist_all(&self, transfers: &[AssetTransfer]) -> Result<PersistSummary> {
        let start = Instant::now();
        let mut summary = PersistSummary::default();

        for transfer in transfers {
            let outcome = self
                .persist(transfer)
                .await
                .with_context(|| {
                    format!("Failed to persist asset transfer {}", transfer.unique_id)
                })?;
            match outcome {
                PersistOutcome::Inserted => summary.inserted += 1,
                PersistOutcome::Duplicate => summary.duplicates += 1,
            }
        }

        if !transfers.is_empty() {
            info!(
                "Inserted {} transfers ({} duplicates) in {:?}",
                summary.inserted,
                summary.duplicates,
                start.elapsed()
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Database, TransferCategory};
    use alloy_primitives::{Address, B256};

    fn transfer(unique_id: &str) -> AssetTransfer {
        AssetTransfer {
            category: TransferCategory::External,
            token_address: None,
            from: Address::repeat_byte(0x11),
            to: Some(Address::repeat_byte(0x22)),
            value: 1.0,
            hash: B256::repeat_byte(0x01),
            block_num: 1,
            unique_id: unique_id.to_string(),
            gas: 21000,
            gas_price: 1.0,
            gas_used: Some(21000),
            timestamp: 1_000,
        }
    }

    #[tokio::test]
    async fn same_unique_id_is_stored_once() {
        let db = Database::open_in_memory().unwrap();
        let gateway = PersistenceGateway::new(Arc::new(db.clone()));

        let first = transfer("0x01:external");
        let mut second = first.clone();
        second.value = 2.0;

        assert_eq!(gateway.persist(&first).await.unwrap(), PersistOutcome::Inserted);
        assert_eq!(gateway.persist(&second).await.unwrap(), PersistOutcome::Duplicate);

        let stored = db.get_transfer("0x01:external").await.unwrap().unwrap();
        assert_eq!(stored.value, 1.0);
    }

    #[tokio::test]
    async fn duplicates_do_not_stop_the_rest_of_the_batch() {
        let db = Database::open_in_memory().unwrap();
        let gateway = PersistenceGateway::new(Arc::new(db.clone()));

        gateway.persist(&transfer("b")).await.unwrap();
        let summary = gateway
            .persist_all(&[transfer("a"), transfer("b"), transfer("c")])
            .await
            .unwrap();

        assert_eq!(summary, PersistSummary { inserted: 2, duplicates: 1 });
        assert!(db.get_transfer("c").await.unwrap().is_some());
    }
}
