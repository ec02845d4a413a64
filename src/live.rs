use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::bus::{MessageBus, NEW_BLOCK_TOPIC};
use crate::chain::ChainProvider;
use crate::repository::CursorStore;

/// Turns head notifications into one `new-blocks` item per block.
///
/// Every block after the stored cursor up to the new head is dispatched, so
/// sparse notifications never leave a gap. A block may be dispatched twice if
/// the cursor lags behind; the persistence gateway absorbs those duplicates.
pub struct LiveFeed {
    cursor: Arc<dyn CursorStore>,
    bus: Arc<dyn MessageBus>,
}

impl LiveFeed {
    pub fn new(cursor: Arc<dyn CursorStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { cursor, bus }
    }

    /// Returns the dispatched block numbers, in dispatch order.
    pub async fn on_new_head(&self, head: u64) -> Result<Vec<u64>> {
        let last_synced = self
            .cursor
            .get_last_synced_block()
            .await?
            .context("No last synced block set, seed it with `indexer set-cursor`")?;

        info!("Submitting new block {} (last synced {})", head, last_synced);

        let mut dispatched = Vec::new();
        for block in last_synced.saturating_add(1)..=head {
            self.bus
                .publish(NEW_BLOCK_TOPIC, block.to_string(), Some(block))
                .await
                .with_context(|| format!("Failed to publish block {block}"))?;
            dispatched.push(block);
        }

        if !dispatched.is_empty() {
            info!("Dispatched {} new blocks up to {}", dispatched.len(), head);
        }
        Ok(dispatched)
    }
}

/// Polls the chain head and feeds every advance to the [`LiveFeed`].
pub struct HeadWatcher {
    provider: Arc<dyn ChainProvider>,
    feed: LiveFeed,
    interval: Duration,
}

impl HeadWatcher {
    pub fn new(provider: Arc<dyn ChainProvider>, feed: LiveFeed, interval: Duration) -> Self {
        Self {
            provider,
            feed,
            interval,
        }
    }

    /// Runs until the task is aborted. Failed polls are logged and retried on
    /// the next tick.
    pub async fn run(&self) {
        let mut last_seen: Option<u64> = None;

        loop {
            match self.poll(last_seen).await {
                Ok(head) => last_seen = head.or(last_seen),
                Err(e) => error!("Could not submit new block: {:#}", e),
            }
            sleep(self.interval).await;
        }
    }

    /// One tick: returns the head if it advanced and was dispatched.
    pub async fn poll(&self, last_seen: Option<u64>) -> Result<Option<u64>> {
        let head = self.provider.get_latest_block().await?;
        if last_seen.is_some_and(|seen| head <= seen) {
            return Ok(None);
        }

        self.feed.on_new_head(head).await?;
        Ok(Some(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use crate::testing::{FakeChain, RecordingBus};

    fn feed(db: &Database, bus: &Arc<RecordingBus>) -> LiveFeed {
        LiveFeed::new(Arc::new(db.clone()), bus.clone())
    }

    #[tokio::test]
    async fn fills_the_gap_up_to_the_new_head() {
        let db = Database::open_in_memory().unwrap();
        let bus = Arc::new(RecordingBus::default());
        db.set_last_synced_block(100).await.unwrap();

        let dispatched = feed(&db, &bus).on_new_head(103).await.unwrap();
        assert_eq!(dispatched, vec![101, 102, 103]);

        let published = bus.published();
        let payloads: Vec<&str> = published.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["101", "102", "103"]);
        let sequence: Vec<Option<u64>> = published.iter().map(|m| m.sequence_id).collect();
        assert_eq!(sequence, vec![Some(101), Some(102), Some(103)]);
        assert!(published.iter().all(|m| m.topic == NEW_BLOCK_TOPIC));
    }

    #[tokio::test]
    async fn head_at_or_behind_cursor_dispatches_nothing() {
        let db = Database::open_in_memory().unwrap();
        let bus = Arc::new(RecordingBus::default());
        db.set_last_synced_block(100).await.unwrap();

        assert!(feed(&db, &bus).on_new_head(100).await.unwrap().is_empty());
        assert!(feed(&db, &bus).on_new_head(90).await.unwrap().is_empty());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn missing_cursor_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let bus = Arc::new(RecordingBus::default());

        assert!(feed(&db, &bus).on_new_head(5).await.is_err());
    }

    #[tokio::test]
    async fn watcher_only_dispatches_when_the_head_moves() {
        let db = Database::open_in_memory().unwrap();
        let bus = Arc::new(RecordingBus::default());
        db.set_last_synced_block(10).await.unwrap();

        let chain = Arc::new(FakeChain::new());
        chain.set_latest(12);
        let watcher = HeadWatcher::new(chain.clone(), feed(&db, &bus), Duration::from_secs(1));

        assert_eq!(watcher.poll(None).await.unwrap(), Some(12));
        assert_eq!(watcher.poll(Some(12)).await.unwrap(), None);
        assert_eq!(bus.published().len(), 2);
    }
}
