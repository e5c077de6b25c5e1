//! Outbox publisher: drains unpublished outbox rows to the broker.
//!
//! Delivery contract: at-least-once with unbounded retries. A row is marked
//! published only after the broker accepted it, so a crash between publish
//! and mark produces a duplicate, never a loss; the consumer's dedup log
//! absorbs duplicates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, MessageProperties, Publication, Topology};
use crate::sales_store::{OutboxMessage, SalesStore};

use super::{WorkerError, WorkerHandle, sleep_or_shutdown};

/// Recorded error text is bounded so a pathological broker error cannot
/// bloat the outbox table.
const MAX_ERROR_LEN: usize = 4000;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    /// Consumer queue declared alongside the exchange so messages published
    /// before the consumer's first poll are not dropped.
    pub queue: String,
    pub routing_key: String,
    /// Max unpublished rows fetched per cycle.
    pub batch_size: i64,
    /// Fixed sleep between polling cycles.
    pub poll_interval: Duration,
    /// Upper bound on the per-failure exponential backoff.
    pub backoff_cap: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: "tableshop.events".to_string(),
            queue: "inventory.events".to_string(),
            routing_key: tableshop_contracts::SALE_COMPLETED_V1.to_string(),
            batch_size: 50,
            poll_interval: Duration::from_millis(1500),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Backoff after `attempts` consecutive failures of one message:
/// `min(cap, 2^min(6, attempts))` seconds.
pub fn backoff_delay(attempts: i32, cap: Duration) -> Duration {
    let exponent = attempts.clamp(0, 6) as u32;
    cap.min(Duration::from_secs(1u64 << exponent))
}

fn truncate(text: &str, max_len: usize) -> &str {
    match text.char_indices().nth(max_len) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct OutboxPublisher<S, B> {
    store: Arc<S>,
    broker: Arc<B>,
    config: PublisherConfig,
}

impl<S, B> OutboxPublisher<S, B>
where
    S: SalesStore,
    B: Broker + 'static,
{
    pub fn new(store: Arc<S>, broker: Arc<B>, config: PublisherConfig) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    fn topology(&self) -> Topology {
        Topology {
            exchange: self.config.exchange.clone(),
            queue: self.config.queue.clone(),
            routing_key: self.config.routing_key.clone(),
        }
    }

    /// Spawn the publisher loop as a background task.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle::new(shutdown_tx, join)
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(exchange = %self.config.exchange, "outbox publisher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.publish_pending(&mut shutdown).await {
                error!(error = %e, "unexpected outbox publisher failure");
            }

            if sleep_or_shutdown(&mut shutdown, self.config.poll_interval).await {
                break;
            }
        }

        info!("outbox publisher stopped");
    }

    /// One polling cycle: fetch a batch of unpublished rows and attempt each
    /// in occurrence order. Returns the number of rows published.
    pub async fn publish_pending(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<usize, WorkerError> {
        self.broker.ensure_topology(&self.topology()).await?;

        let messages = self
            .store
            .unpublished_messages(self.config.batch_size)
            .await?;

        let mut published = 0usize;
        for message in messages {
            if *shutdown.borrow() {
                break;
            }

            match self
                .broker
                .publish(&self.config.exchange, to_publication(&message))
                .await
            {
                Ok(()) => {
                    self.store
                        .mark_published(message.outbox_message_id, Utc::now())
                        .await?;
                    published += 1;
                    debug!(
                        outbox_message_id = %message.outbox_message_id,
                        event_type = %message.event_type,
                        "published outbox message"
                    );
                }
                Err(e) => {
                    let error_text = e.to_string();
                    self.store
                        .record_publish_failure(
                            message.outbox_message_id,
                            truncate(&error_text, MAX_ERROR_LEN),
                        )
                        .await?;

                    let attempts = message.publish_attempts + 1;
                    warn!(
                        outbox_message_id = %message.outbox_message_id,
                        attempts,
                        error = %error_text,
                        "failed publishing outbox message"
                    );

                    if sleep_or_shutdown(
                        shutdown,
                        backoff_delay(attempts, self.config.backoff_cap),
                    )
                    .await
                    {
                        break;
                    }
                }
            }
        }

        Ok(published)
    }
}

fn to_publication(message: &OutboxMessage) -> Publication {
    Publication {
        routing_key: message.event_type.clone(),
        properties: MessageProperties {
            message_id: message.outbox_message_id,
            correlation_id: message.correlation_id,
            content_type: "application/json".to_string(),
            event_type: message.event_type.clone(),
            occurred_at: message.occurred_at,
            persistent: true,
        },
        body: message.payload_json.clone().into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::sales_store::{InMemorySalesStore, SalesSession, SalesStore};
    use tableshop_contracts::SALE_COMPLETED_V1;
    use tableshop_core::{CampaignId, SaleId};
    use uuid::Uuid;

    fn publisher(
        store: &InMemorySalesStore,
        broker: &Arc<InMemoryBroker>,
    ) -> OutboxPublisher<InMemorySalesStore, InMemoryBroker> {
        OutboxPublisher::new(
            Arc::new(store.clone()),
            Arc::clone(broker),
            PublisherConfig::default(),
        )
    }

    async fn seed_message(store: &InMemorySalesStore, payload: &str) -> Uuid {
        let message = OutboxMessage::pending(
            Utc::now(),
            SALE_COMPLETED_V1,
            SaleId::new(),
            CampaignId::new(),
            Uuid::now_v7(),
            payload.to_string(),
        );
        let mut session = store.begin().await.unwrap();
        session.insert_outbox_message(&message).await.unwrap();
        session.commit().await.unwrap();
        message.outbox_message_id
    }

    #[test]
    fn backoff_grows_exponentially_and_is_capped_at_thirty_seconds() {
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(1, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, cap), Duration::from_secs(8));
        assert_eq!(backoff_delay(5, cap), Duration::from_secs(30));
        // Attempts beyond the exponent clamp stay at the cap, never overflow.
        assert_eq!(backoff_delay(64, cap), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn publishes_pending_rows_and_marks_them_published() {
        let store = InMemorySalesStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let worker = publisher(&store, &broker);

        seed_message(&store, r#"{"n":1}"#).await;
        seed_message(&store, r#"{"n":2}"#).await;

        let (_tx, mut rx) = watch::channel(false);
        let published = worker.publish_pending(&mut rx).await.unwrap();

        assert_eq!(published, 2);
        assert!(store.unpublished_messages(10).await.unwrap().is_empty());
        assert_eq!(broker.ready_len("inventory.events"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn broker_outage_leaves_rows_unpublished_with_growing_attempts() {
        let store = InMemorySalesStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let worker = publisher(&store, &broker);

        seed_message(&store, r#"{"n":1}"#).await;
        broker.set_publish_failing(true);

        let (_tx, mut rx) = watch::channel(false);
        for _ in 0..3 {
            worker.publish_pending(&mut rx).await.unwrap();
        }

        let pending = store.unpublished_messages(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].publish_attempts, 3);
        assert!(pending[0].last_error.is_some());
        assert!(pending[0].published_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_and_publishes_once_broker_is_reachable_again() {
        let store = InMemorySalesStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let worker = publisher(&store, &broker);

        let id = seed_message(&store, r#"{"n":1}"#).await;
        broker.set_publish_failing(true);

        let (_tx, mut rx) = watch::channel(false);
        worker.publish_pending(&mut rx).await.unwrap();
        assert_eq!(broker.ready_len("inventory.events"), 0);

        broker.set_publish_failing(false);
        let published = worker.publish_pending(&mut rx).await.unwrap();
        assert_eq!(published, 1);

        assert_eq!(broker.ready_len("inventory.events"), 1);
        let snapshot = store.outbox_snapshot();
        let row = snapshot
            .iter()
            .find(|m| m.outbox_message_id == id)
            .unwrap();
        assert!(row.published_at.is_some());
        assert!(row.last_error.is_none());
        assert_eq!(row.publish_attempts, 1);
    }

    #[tokio::test]
    async fn shutdown_mid_batch_stops_between_messages() {
        let store = InMemorySalesStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let worker = publisher(&store, &broker);

        seed_message(&store, r#"{"n":1}"#).await;
        seed_message(&store, r#"{"n":2}"#).await;

        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let published = worker.publish_pending(&mut rx).await.unwrap();
        assert_eq!(published, 0);
        assert_eq!(store.unpublished_messages(10).await.unwrap().len(), 2);
    }
}
