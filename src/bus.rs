//! Work-item transport.
//!
//! Topics fan out to named subscriptions: every subscription on a topic gets
//! its own copy of each item, while consumers sharing one subscription name
//! compete for items so each copy is handled once. Items are delivered in
//! publish order per subscription.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const NEW_BLOCK_TOPIC: &str = "new-blocks";
pub const FETCH_HISTORIC_DATA_TOPIC: &str = "fetch-historic-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    /// Ordering marker set by the producer, when it has one.
    pub sequence_id: Option<u64>,
    pub redelivery_count: u32,
}

impl Message {
    pub fn new(topic: &str, payload: String, sequence_id: Option<u64>) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            sequence_id,
            redelivery_count: 0,
        }
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: String, sequence_id: Option<u64>) -> Result<()>;
}

/// What happens to a work item whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Acknowledge regardless of the outcome. A failed item is dropped.
    #[default]
    Always,
    /// Only acknowledge handled items; failed items are redelivered.
    OnSuccess,
}

impl FromStr for AckPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(AckPolicy::Always),
            "on-success" | "on_success" => Ok(AckPolicy::OnSuccess),
            other => Err(anyhow::anyhow!("Unknown ack policy: {}", other)),
        }
    }
}

struct SubscriptionQueue {
    sender: mpsc::UnboundedSender<Message>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

/// In-process bus. Items published before a subscription exists are not
/// delivered to it.
#[derive(Default)]
pub struct LocalBus {
    topics: Mutex<HashMap<String, HashMap<String, Arc<SubscriptionQueue>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a consumer to `subscription` on `topic`, creating the
    /// subscription on first use.
    pub fn subscribe(&self, topic: &str, subscription: &str) -> Result<Consumer> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| anyhow::anyhow!("Bus registry mutex poisoned"))?;

        let queue = topics
            .entry(topic.to_string())
            .or_default()
            .entry(subscription.to_string())
            .or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                Arc::new(SubscriptionQueue {
                    sender,
                    receiver: tokio::sync::Mutex::new(receiver),
                })
            })
            .clone();

        Ok(Consumer {
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            queue,
        })
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: String, sequence_id: Option<u64>) -> Result<()> {
        let topics = self
            .topics
            .lock()
            .map_err(|_| anyhow::anyhow!("Bus registry mutex poisoned"))?;

        let Some(subscriptions) = topics.get(topic) else {
            debug!("No subscriptions on {}, dropping item", topic);
            return Ok(());
        };

        for (name, queue) in subscriptions {
            if queue
                .sender
                .send(Message::new(topic, payload.clone(), sequence_id))
                .is_err()
            {
                warn!("Subscription {} on {} is closed", name, topic);
            }
        }
        Ok(())
    }
}

/// Handle on one subscription. Clones compete for the same items.
#[derive(Clone)]
pub struct Consumer {
    topic: String,
    subscription: String,
    queue: Arc<SubscriptionQueue>,
}

impl Consumer {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub async fn receive(&self) -> Option<Message> {
        self.queue.receiver.lock().await.recv().await
    }

    pub fn acknowledge(&self, message: &Message) {
        debug!(
            subscription = %self.subscription,
            sequence_id = ?message.sequence_id,
            "Acknowledged work item"
        );
    }

    /// Put the item back on this subscription after `delay`.
    pub fn redeliver(&self, mut message: Message, delay: Duration) {
        message.redelivery_count += 1;
        let queue = self.queue.clone();
        let subscription = self.subscription.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if queue.sender.send(message).is_err() {
                warn!("Subscription {} closed before redelivery", subscription);
            }
        });
    }
}

#[async_trait]
pub trait WorkItemHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acknowledged,
    Redelivered,
}

/// Handle one item and settle it according to `policy`.
///
/// Handler errors are logged here and never propagate to the consumer loop.
pub async fn process_message(
    consumer: &Consumer,
    handler: &dyn WorkItemHandler,
    message: Message,
    policy: AckPolicy,
    redelivery_delay: Duration,
) -> Disposition {
    let Err(e) = handler.handle(&message).await else {
        consumer.acknowledge(&message);
        return Disposition::Acknowledged;
    };

    error!(
        subscription = %consumer.subscription(),
        topic = %message.topic,
        payload = %message.payload,
        redelivery_count = message.redelivery_count,
        "Failed to process work item: {:#}",
        e
    );

    match policy {
        AckPolicy::Always => {
            consumer.acknowledge(&message);
            Disposition::Acknowledged
        }
        AckPolicy::OnSuccess => {
            consumer.redeliver(message, redelivery_delay);
            Disposition::Redelivered
        }
    }
}

/// Consume items until the subscription closes.
pub async fn run_consumer(
    consumer: Consumer,
    handler: Arc<dyn WorkItemHandler>,
    policy: AckPolicy,
    redelivery_delay: Duration,
) {
    info!(
        "Consumer started for subscription {} on {} ({:?})",
        consumer.subscription(),
        consumer.topic(),
        policy
    );

    while let Some(message) = consumer.receive().await {
        process_message(&consumer, handler.as_ref(), message, policy, redelivery_delay).await;
    }

    info!("Consumer for subscription {} stopped", consumer.subscription());
}
