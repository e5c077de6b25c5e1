//! Sales-side persistence: orders, lines, and the transactional outbox.
//!
//! Mutating flows go through a [`SalesSession`], one session per unit of
//! work. Whatever a session wrote is atomically visible after `commit`;
//! dropping a session without committing discards its writes. This is how
//! the completion flow guarantees the outbox row and the status change share
//! one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tableshop_core::{CampaignId, CustomerId, SaleId, WorldDay};
use tableshop_sales::{SalesOrder, SalesOrderLine};

use crate::error::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemorySalesStore;
pub use postgres::PgSalesStore;

/// One durable row of cross-service intent: an event that must eventually be
/// published. Written only inside the transaction that produced the state
/// change it describes; afterwards mutated only by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub outbox_message_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    /// The sale the event describes.
    pub aggregate_id: SaleId,
    pub campaign_id: CampaignId,
    pub correlation_id: Uuid,
    pub payload_json: String,
    /// `None` while pending; set once by the publisher.
    pub published_at: Option<DateTime<Utc>>,
    pub publish_attempts: i32,
    pub last_error: Option<String>,
}

impl OutboxMessage {
    /// A freshly-recorded, not-yet-published message.
    pub fn pending(
        occurred_at: DateTime<Utc>,
        event_type: impl Into<String>,
        aggregate_id: SaleId,
        campaign_id: CampaignId,
        correlation_id: Uuid,
        payload_json: String,
    ) -> Self {
        Self {
            outbox_message_id: Uuid::now_v7(),
            occurred_at,
            event_type: event_type.into(),
            aggregate_id,
            campaign_id,
            correlation_id,
            payload_json,
            published_at: None,
            publish_attempts: 0,
            last_error: None,
        }
    }
}

/// Filters for listing sales.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleFilter {
    pub from_world_day: Option<WorldDay>,
    pub to_world_day: Option<WorldDay>,
    pub customer_id: Option<CustomerId>,
}

#[async_trait]
pub trait SalesStore: Send + Sync + 'static {
    type Session: SalesSession;

    /// Open a transactional session for one unit of work.
    async fn begin(&self) -> Result<Self::Session, StoreError>;

    async fn insert_sale(&self, sale: &SalesOrder) -> Result<(), StoreError>;

    async fn sale(
        &self,
        campaign_id: CampaignId,
        sale_id: SaleId,
    ) -> Result<Option<SalesOrder>, StoreError>;

    async fn sale_lines(&self, sale_id: SaleId) -> Result<Vec<SalesOrderLine>, StoreError>;

    /// List sales for a campaign, newest world day first.
    async fn list_sales(
        &self,
        campaign_id: CampaignId,
        filter: &SaleFilter,
    ) -> Result<Vec<SalesOrder>, StoreError>;

    /// Unpublished outbox rows, oldest occurrence first.
    async fn unpublished_messages(&self, limit: i64) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Record a successful publish: set the publish timestamp, clear any
    /// recorded error.
    async fn mark_published(
        &self,
        outbox_message_id: Uuid,
        published_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record a failed publish attempt: bump the attempt counter, keep the
    /// row unpublished for the next cycle.
    async fn record_publish_failure(
        &self,
        outbox_message_id: Uuid,
        error: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SalesSession: Send {
    async fn sale_for_update(
        &mut self,
        campaign_id: CampaignId,
        sale_id: SaleId,
    ) -> Result<Option<SalesOrder>, StoreError>;

    async fn sale_lines(&mut self, sale_id: SaleId) -> Result<Vec<SalesOrderLine>, StoreError>;

    /// Replace all lines of a draft sale.
    async fn replace_lines(
        &mut self,
        sale_id: SaleId,
        lines: &[SalesOrderLine],
    ) -> Result<(), StoreError>;

    async fn update_sale(&mut self, sale: &SalesOrder) -> Result<(), StoreError>;

    async fn insert_outbox_message(&mut self, message: &OutboxMessage) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
