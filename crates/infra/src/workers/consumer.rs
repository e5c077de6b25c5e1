//! Sale-completed consumer: applies completed sales to the lot ledger.
//!
//! Policy summary, in processing order:
//! - malformed body or unknown event type: ack and discard (poison messages
//!   must not block the queue);
//! - duplicate event id: empty transaction, ack (idempotency short-circuit);
//! - malformed identifiers: record the event as processed anyway; a data
//!   problem is permanent, retrying cannot fix it;
//! - bad individual lines: skipped, the rest of the event still applies;
//! - insufficient stock: lots drain to zero and the unmet remainder becomes
//!   a lot-less `ManualCorrection` adjustment flagged "INSUFFICIENT STOCK",
//!   and the event still counts as processed;
//! - anything unexpected: nack with requeue, pause, retry. This is the only
//!   path that redelivers a possibly-partially-processed event, which is why
//!   the dedup check runs first and inside the same transaction as the
//!   mutations it guards.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use tableshop_contracts::{EventEnvelope, SALE_COMPLETED_V1, SaleCompletedEvent};
use tableshop_core::{AdjustmentId, CampaignId, ItemId, StorageLocationId, UserId, WorldDay};
use tableshop_inventory::{
    AdjustmentReason, AdjustmentReference, InventoryAdjustment, plan_consumption,
};

use crate::broker::{Broker, Delivery, Topology};
use crate::error::StoreError;
use crate::inventory_store::{InventorySession, InventoryStore};

use super::{WorkerError, WorkerHandle, sleep_or_shutdown};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    /// Sleep when the queue is empty.
    pub poll_interval: Duration,
    /// Pause after a nacked delivery or broker error.
    pub failure_pause: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            exchange: "tableshop.events".to_string(),
            queue: "inventory.events".to_string(),
            routing_key: SALE_COMPLETED_V1.to_string(),
            poll_interval: Duration::from_millis(1500),
            failure_pause: Duration::from_secs(2),
        }
    }
}

/// Outcome of one poll, mostly interesting to tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Queue was empty.
    Idle,
    /// A delivery was processed (or deliberately discarded) and acked.
    Acked,
    /// A delivery failed unexpectedly and was requeued.
    Requeued,
}

pub struct SaleCompletedConsumer<I, B> {
    store: Arc<I>,
    broker: Arc<B>,
    config: ConsumerConfig,
}

impl<I, B> SaleCompletedConsumer<I, B>
where
    I: InventoryStore,
    B: Broker + 'static,
{
    pub fn new(store: Arc<I>, broker: Arc<B>, config: ConsumerConfig) -> Self {
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

    /// Spawn the consumer loop as a background task.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle::new(shutdown_tx, join)
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.config.queue, "inventory event consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(PollOutcome::Idle) => {
                    if sleep_or_shutdown(&mut shutdown, self.config.poll_interval).await {
                        break;
                    }
                }
                Ok(PollOutcome::Acked) => {}
                Ok(PollOutcome::Requeued) => {
                    if sleep_or_shutdown(&mut shutdown, self.config.failure_pause).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "inventory consumer broker cycle failed");
                    if sleep_or_shutdown(&mut shutdown, self.config.failure_pause).await {
                        break;
                    }
                }
            }
        }

        info!("inventory event consumer stopped");
    }

    /// Pull and process at most one message. Public so tests can drive the
    /// consumer deterministically.
    pub async fn poll_once(&self) -> Result<PollOutcome, WorkerError> {
        self.broker.ensure_topology(&self.topology()).await?;

        let Some(delivery) = self.broker.get(&self.config.queue).await? else {
            return Ok(PollOutcome::Idle);
        };

        if self.handle_delivery(&delivery).await {
            self.broker
                .ack(&self.config.queue, &delivery.receipt)
                .await?;
            Ok(PollOutcome::Acked)
        } else {
            self.broker
                .nack_requeue(&self.config.queue, &delivery.receipt)
                .await?;
            Ok(PollOutcome::Requeued)
        }
    }

    /// Returns true when the delivery should be acknowledged.
    async fn handle_delivery(&self, delivery: &Delivery) -> bool {
        let envelope: EventEnvelope<SaleCompletedEvent> =
            match serde_json::from_slice(&delivery.body) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(error = %e, "failed to deserialize inventory event payload; discarding");
                    return true;
                }
            };

        if envelope.event_type != SALE_COMPLETED_V1 {
            warn!(event_type = %envelope.event_type, "skipping unsupported event type");
            return true;
        }

        match self.apply_sale_completed(&envelope).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    event_id = %envelope.event_id,
                    error = %e,
                    "failed to process sale completed event"
                );
                false
            }
        }
    }

    async fn apply_sale_completed(
        &self,
        envelope: &EventEnvelope<SaleCompletedEvent>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let campaign_uuid = if !envelope.campaign_id.is_nil() {
            envelope.campaign_id
        } else {
            envelope.data.campaign_id
        };
        let sale_uuid = envelope.data.sale_id;
        let location_uuid = envelope.data.storage_location_id;
        let world_day = WorldDay::clamped(envelope.data.sold_world_day);

        let mut session = self.store.begin().await?;

        // Dedup check first, inside the same transaction as the mutations it
        // guards: a redelivered event commits empty and is acked.
        if session.is_event_processed(envelope.event_id).await? {
            session.commit().await?;
            return Ok(());
        }

        if campaign_uuid.is_nil() || sale_uuid.is_nil() || location_uuid.is_nil() {
            error!(
                event_id = %envelope.event_id,
                campaign_id = %campaign_uuid,
                sale_id = %sale_uuid,
                storage_location_id = %location_uuid,
                "ignoring malformed sale event"
            );

            // A malformed event is a permanent failure; record it so it is
            // never retried.
            session.mark_event_processed(envelope.event_id, now).await?;
            session.commit().await?;
            return Ok(());
        }

        let campaign_id = CampaignId::from_uuid(campaign_uuid);
        let storage_location_id = StorageLocationId::from_uuid(location_uuid);
        let applied_by = UserId::from_uuid(Uuid::nil());

        for line in &envelope.data.lines {
            let quantity = line.quantity;
            if line.item_id.is_nil() || !quantity.is_positive() {
                warn!(
                    event_id = %envelope.event_id,
                    item_id = %line.item_id,
                    quantity = %quantity,
                    "skipping invalid sale line"
                );
                continue;
            }

            let item_id = ItemId::from_uuid(line.item_id);
            let lots = session
                .lots_for_item(campaign_id, item_id, storage_location_id)
                .await?;

            let plan = plan_consumption(&lots, quantity);

            for consumption in &plan.consumptions {
                session
                    .update_lot_quantity(consumption.lot_id, consumption.remaining_on_hand, now)
                    .await?;
                session
                    .insert_adjustment(&InventoryAdjustment {
                        adjustment_id: AdjustmentId::new(),
                        campaign_id,
                        item_id,
                        storage_location_id,
                        lot_id: Some(consumption.lot_id),
                        delta_quantity: -consumption.consumed,
                        reason: AdjustmentReason::Sale,
                        world_day,
                        notes: None,
                        reference: Some(AdjustmentReference::sale(sale_uuid)),
                        created_by_user_id: applied_by,
                        created_at: now,
                    })
                    .await?;
            }

            if plan.shortfall.is_positive() {
                error!(
                    sale_id = %sale_uuid,
                    campaign_id = %campaign_id,
                    item_id = %item_id,
                    missing_quantity = %plan.shortfall,
                    correlation_id = %envelope.correlation_id,
                    "INSUFFICIENT STOCK"
                );

                // Oversell is recorded, not blocked: the audit trail goes
                // conceptually negative while lot rows stay clamped at zero.
                session
                    .insert_adjustment(&InventoryAdjustment {
                        adjustment_id: AdjustmentId::new(),
                        campaign_id,
                        item_id,
                        storage_location_id,
                        lot_id: None,
                        delta_quantity: -plan.shortfall,
                        reason: AdjustmentReason::ManualCorrection,
                        world_day,
                        notes: Some("INSUFFICIENT STOCK".to_string()),
                        reference: Some(AdjustmentReference::sale(sale_uuid)),
                        created_by_user_id: applied_by,
                        created_at: now,
                    })
                    .await?;
            }
        }

        session.mark_event_processed(envelope.event_id, now).await?;
        session.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, MessageProperties, Publication};
    use crate::inventory_store::{AdjustmentFilter, InMemoryInventoryStore, InventoryStore};
    use crate::services::inventory::{CreateLotCommand, create_lot};
    use tableshop_contracts::MoneyDto;
    use tableshop_core::{LotId, Quantity};

    struct Fixture {
        store: Arc<InMemoryInventoryStore>,
        broker: Arc<InMemoryBroker>,
        consumer: SaleCompletedConsumer<InMemoryInventoryStore, InMemoryBroker>,
        campaign_id: CampaignId,
        item_id: ItemId,
        location_id: StorageLocationId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryInventoryStore::new());
            let broker = Arc::new(InMemoryBroker::new());
            let consumer = SaleCompletedConsumer::new(
                Arc::clone(&store),
                Arc::clone(&broker),
                ConsumerConfig::default(),
            );
            Self {
                store,
                broker,
                consumer,
                campaign_id: CampaignId::new(),
                item_id: ItemId::new(),
                location_id: StorageLocationId::new(),
            }
        }

        async fn seed_lot(&self, day: i32, quantity: i64) -> LotId {
            create_lot(
                self.store.as_ref(),
                CreateLotCommand {
                    campaign_id: self.campaign_id,
                    item_id: self.item_id,
                    storage_location_id: self.location_id,
                    quantity: Quantity::from_i64(quantity),
                    unit_cost_minor: 100,
                    acquired_world_day: WorldDay::new(day).unwrap(),
                    source: None,
                    notes: None,
                    created_by_user_id: UserId::new(),
                },
            )
            .await
            .unwrap()
        }

        fn envelope(&self, quantity: i64) -> EventEnvelope<SaleCompletedEvent> {
            EventEnvelope::new(
                SALE_COMPLETED_V1,
                Utc::now(),
                *self.campaign_id.as_uuid(),
                Uuid::now_v7(),
                SaleCompletedEvent {
                    sale_id: Uuid::now_v7(),
                    campaign_id: *self.campaign_id.as_uuid(),
                    sold_world_day: 20,
                    storage_location_id: *self.location_id.as_uuid(),
                    customer_id: None,
                    total: MoneyDto::new(1000, "GSC"),
                    tax_total: MoneyDto::new(0, "GSC"),
                    lines: vec![tableshop_contracts::SaleCompletedLine {
                        item_id: *self.item_id.as_uuid(),
                        quantity: Quantity::from_i64(quantity),
                        unit_sold_price: MoneyDto::new(500, "GSC"),
                        unit_true_value: MoneyDto::new(500, "GSC"),
                    }],
                },
            )
        }

        async fn deliver_raw(&self, body: Vec<u8>) {
            let topo = Topology {
                exchange: "tableshop.events".to_string(),
                queue: "inventory.events".to_string(),
                routing_key: SALE_COMPLETED_V1.to_string(),
            };
            self.broker.ensure_topology(&topo).await.unwrap();
            self.broker
                .publish(
                    &topo.exchange,
                    Publication {
                        routing_key: SALE_COMPLETED_V1.to_string(),
                        properties: MessageProperties {
                            message_id: Uuid::now_v7(),
                            correlation_id: Uuid::now_v7(),
                            content_type: "application/json".to_string(),
                            event_type: SALE_COMPLETED_V1.to_string(),
                            occurred_at: Utc::now(),
                            persistent: true,
                        },
                        body,
                    },
                )
                .await
                .unwrap();
        }

        async fn deliver(&self, envelope: &EventEnvelope<SaleCompletedEvent>) {
            self.deliver_raw(serde_json::to_vec(envelope).unwrap()).await;
        }

        async fn adjustments(&self) -> Vec<InventoryAdjustment> {
            self.store
                .adjustments(self.campaign_id, &AdjustmentFilter::default())
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn consumes_lots_fifo_and_records_sale_adjustments() {
        let fx = Fixture::new();
        let day10 = fx.seed_lot(10, 5).await;
        let day12 = fx.seed_lot(12, 5).await;
        let day15 = fx.seed_lot(15, 5).await;

        fx.deliver(&fx.envelope(8)).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);

        assert_eq!(fx.store.lot_quantity(day10), Some(Quantity::ZERO));
        assert_eq!(fx.store.lot_quantity(day12), Some(Quantity::from_i64(2)));
        assert_eq!(fx.store.lot_quantity(day15), Some(Quantity::from_i64(5)));

        let sale_adjustments: Vec<_> = fx
            .adjustments()
            .await
            .into_iter()
            .filter(|a| a.reason == AdjustmentReason::Sale)
            .collect();
        assert_eq!(sale_adjustments.len(), 2);
        assert_eq!(sale_adjustments[0].delta_quantity, Quantity::from_i64(-5));
        assert_eq!(sale_adjustments[1].delta_quantity, Quantity::from_i64(-3));
        assert!(sale_adjustments.iter().all(|a| a.lot_id.is_some()));
        assert!(
            sale_adjustments
                .iter()
                .all(|a| a.reference.as_ref().unwrap().reference_type == "Sale")
        );
    }

    #[tokio::test]
    async fn replaying_the_same_event_id_is_idempotent() {
        let fx = Fixture::new();
        let lot_id = fx.seed_lot(10, 5).await;
        let envelope = fx.envelope(2);

        fx.deliver(&envelope).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);

        // Same event id delivered again (broker redelivery).
        fx.deliver(&envelope).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);

        assert_eq!(fx.store.lot_quantity(lot_id), Some(Quantity::from_i64(3)));
        assert_eq!(fx.store.processed_event_count(), 1);

        let sale_adjustments = fx
            .adjustments()
            .await
            .into_iter()
            .filter(|a| a.reason == AdjustmentReason::Sale)
            .count();
        assert_eq!(sale_adjustments, 1);
    }

    #[tokio::test]
    async fn insufficiency_drains_lots_and_audits_the_shortfall() {
        let fx = Fixture::new();
        let day10 = fx.seed_lot(10, 2).await;
        let day12 = fx.seed_lot(12, 3).await;

        fx.deliver(&fx.envelope(8)).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);

        assert_eq!(fx.store.lot_quantity(day10), Some(Quantity::ZERO));
        assert_eq!(fx.store.lot_quantity(day12), Some(Quantity::ZERO));

        let adjustments = fx.adjustments().await;
        let correction = adjustments
            .iter()
            .find(|a| a.reason == AdjustmentReason::ManualCorrection)
            .unwrap();
        assert_eq!(correction.delta_quantity, Quantity::from_i64(-3));
        assert!(correction.lot_id.is_none());
        assert_eq!(correction.notes.as_deref(), Some("INSUFFICIENT STOCK"));
        assert_eq!(
            correction.reference.as_ref().unwrap().reference_type,
            "Sale"
        );

        // Still processed: oversell is recorded, not blocked.
        assert_eq!(fx.store.processed_event_count(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_acked_and_discarded() {
        let fx = Fixture::new();
        fx.seed_lot(10, 5).await;

        fx.deliver_raw(b"not json at all".to_vec()).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);

        assert_eq!(fx.store.processed_event_count(), 0);
        assert!(fx.broker.ready_len("inventory.events") == 0);
    }

    #[tokio::test]
    async fn unknown_event_type_is_acked_and_discarded() {
        let fx = Fixture::new();
        let mut envelope = fx.envelope(2);
        envelope.event_type = "sales.sale_voided.v1".to_string();

        fx.deliver(&envelope).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);
        assert_eq!(fx.store.processed_event_count(), 0);
    }

    #[tokio::test]
    async fn malformed_ids_are_recorded_as_processed_and_never_retried() {
        let fx = Fixture::new();
        let lot_id = fx.seed_lot(10, 5).await;

        let mut envelope = fx.envelope(2);
        envelope.campaign_id = Uuid::nil();
        envelope.data.campaign_id = Uuid::nil();

        fx.deliver(&envelope).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);

        // No stock movement, but the event id is burned.
        assert_eq!(fx.store.lot_quantity(lot_id), Some(Quantity::from_i64(5)));
        assert_eq!(fx.store.processed_event_count(), 1);
    }

    #[tokio::test]
    async fn invalid_lines_are_skipped_but_valid_lines_apply() {
        let fx = Fixture::new();
        let lot_id = fx.seed_lot(10, 5).await;

        let mut envelope = fx.envelope(2);
        envelope.data.lines.push(tableshop_contracts::SaleCompletedLine {
            item_id: Uuid::nil(),
            quantity: Quantity::from_i64(3),
            unit_sold_price: MoneyDto::new(100, "GSC"),
            unit_true_value: MoneyDto::new(100, "GSC"),
        });
        envelope.data.lines.push(tableshop_contracts::SaleCompletedLine {
            item_id: *fx.item_id.as_uuid(),
            quantity: Quantity::from_i64(-1),
            unit_sold_price: MoneyDto::new(100, "GSC"),
            unit_true_value: MoneyDto::new(100, "GSC"),
        });

        fx.deliver(&envelope).await;
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Acked);

        // Only the valid first line consumed stock.
        assert_eq!(fx.store.lot_quantity(lot_id), Some(Quantity::from_i64(3)));
        assert_eq!(fx.store.processed_event_count(), 1);
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let fx = Fixture::new();
        assert_eq!(fx.consumer.poll_once().await.unwrap(), PollOutcome::Idle);
    }
}
