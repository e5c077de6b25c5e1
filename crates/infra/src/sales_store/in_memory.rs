//! In-memory sales store for tests and dev.
//!
//! Sessions stage writes and apply them atomically on commit; a dropped
//! session discards everything, mirroring transaction rollback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tableshop_core::{CampaignId, SaleId};
use tableshop_sales::{SalesOrder, SalesOrderLine};

use crate::error::StoreError;

use super::{OutboxMessage, SaleFilter, SalesSession, SalesStore};

#[derive(Debug, Default)]
struct SalesState {
    sales: HashMap<SaleId, SalesOrder>,
    lines: HashMap<SaleId, Vec<SalesOrderLine>>,
    outbox: Vec<OutboxMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySalesStore {
    state: Arc<Mutex<SalesState>>,
}

impl InMemorySalesStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SalesState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("sales state lock poisoned".to_string()))
    }

    /// Test hook: the full outbox table, including published rows.
    pub fn outbox_snapshot(&self) -> Vec<OutboxMessage> {
        self.lock().map(|s| s.outbox.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SalesStore for InMemorySalesStore {
    type Session = InMemorySalesSession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        Ok(InMemorySalesSession {
            state: Arc::clone(&self.state),
            staged_sales: Vec::new(),
            staged_lines: Vec::new(),
            staged_outbox: Vec::new(),
        })
    }

    async fn insert_sale(&self, sale: &SalesOrder) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.sales.insert(sale.sale_id, sale.clone());
        state.lines.entry(sale.sale_id).or_default();
        Ok(())
    }

    async fn sale(
        &self,
        campaign_id: CampaignId,
        sale_id: SaleId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .sales
            .get(&sale_id)
            .filter(|s| s.campaign_id == campaign_id)
            .cloned())
    }

    async fn sale_lines(&self, sale_id: SaleId) -> Result<Vec<SalesOrderLine>, StoreError> {
        let state = self.lock()?;
        Ok(state.lines.get(&sale_id).cloned().unwrap_or_default())
    }

    async fn list_sales(
        &self,
        campaign_id: CampaignId,
        filter: &SaleFilter,
    ) -> Result<Vec<SalesOrder>, StoreError> {
        let state = self.lock()?;
        let mut sales: Vec<SalesOrder> = state
            .sales
            .values()
            .filter(|s| s.campaign_id == campaign_id)
            .filter(|s| {
                filter
                    .from_world_day
                    .is_none_or(|from| s.sold_world_day >= from)
            })
            .filter(|s| filter.to_world_day.is_none_or(|to| s.sold_world_day <= to))
            .filter(|s| {
                filter
                    .customer_id
                    .is_none_or(|customer| s.customer_id == Some(customer))
            })
            .cloned()
            .collect();

        sales.sort_by(|a, b| {
            b.sold_world_day
                .cmp(&a.sold_world_day)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(sales)
    }

    async fn unpublished_messages(&self, limit: i64) -> Result<Vec<OutboxMessage>, StoreError> {
        let state = self.lock()?;
        let mut pending: Vec<OutboxMessage> = state
            .outbox
            .iter()
            .filter(|m| m.published_at.is_none())
            .cloned()
            .collect();

        pending.sort_by_key(|m| m.occurred_at);
        pending.truncate(limit.max(1) as usize);
        Ok(pending)
    }

    async fn mark_published(
        &self,
        outbox_message_id: Uuid,
        published_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(message) = state
            .outbox
            .iter_mut()
            .find(|m| m.outbox_message_id == outbox_message_id)
        {
            message.published_at = Some(published_at);
            message.last_error = None;
        }
        Ok(())
    }

    async fn record_publish_failure(
        &self,
        outbox_message_id: Uuid,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(message) = state
            .outbox
            .iter_mut()
            .find(|m| m.outbox_message_id == outbox_message_id)
        {
            message.publish_attempts += 1;
            message.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

pub struct InMemorySalesSession {
    state: Arc<Mutex<SalesState>>,
    staged_sales: Vec<SalesOrder>,
    staged_lines: Vec<(SaleId, Vec<SalesOrderLine>)>,
    staged_outbox: Vec<OutboxMessage>,
}

impl InMemorySalesSession {
    fn lock(&self) -> Result<MutexGuard<'_, SalesState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("sales state lock poisoned".to_string()))
    }
}

#[async_trait]
impl SalesSession for InMemorySalesSession {
    async fn sale_for_update(
        &mut self,
        campaign_id: CampaignId,
        sale_id: SaleId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .sales
            .get(&sale_id)
            .filter(|s| s.campaign_id == campaign_id)
            .cloned())
    }

    async fn sale_lines(&mut self, sale_id: SaleId) -> Result<Vec<SalesOrderLine>, StoreError> {
        // Staged replacements win over committed state, like reads inside an
        // open transaction.
        if let Some((_, lines)) = self
            .staged_lines
            .iter()
            .rev()
            .find(|(id, _)| *id == sale_id)
        {
            return Ok(lines.clone());
        }

        let state = self.lock()?;
        Ok(state.lines.get(&sale_id).cloned().unwrap_or_default())
    }

    async fn replace_lines(
        &mut self,
        sale_id: SaleId,
        lines: &[SalesOrderLine],
    ) -> Result<(), StoreError> {
        self.staged_lines.push((sale_id, lines.to_vec()));
        Ok(())
    }

    async fn update_sale(&mut self, sale: &SalesOrder) -> Result<(), StoreError> {
        self.staged_sales.push(sale.clone());
        Ok(())
    }

    async fn insert_outbox_message(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        self.staged_outbox.push(message.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Database("sales state lock poisoned".to_string()))?;

        for sale in self.staged_sales {
            state.sales.insert(sale.sale_id, sale);
        }
        for (sale_id, lines) in self.staged_lines {
            state.lines.insert(sale_id, lines);
        }
        state.outbox.extend(self.staged_outbox);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tableshop_core::{StorageLocationId, UserId, WorldDay};

    fn draft_sale(campaign_id: CampaignId) -> SalesOrder {
        SalesOrder::draft(
            SaleId::new(),
            campaign_id,
            StorageLocationId::new(),
            WorldDay::new(5).unwrap(),
            None,
            None,
            UserId::new(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn dropped_session_discards_writes() {
        let store = InMemorySalesStore::new();
        let campaign_id = CampaignId::new();
        let sale = draft_sale(campaign_id);
        store.insert_sale(&sale).await.unwrap();

        {
            let mut session = store.begin().await.unwrap();
            let mut updated = session
                .sale_for_update(campaign_id, sale.sale_id)
                .await
                .unwrap()
                .unwrap();
            updated.total_minor = 999;
            session.update_sale(&updated).await.unwrap();
            // Dropped without commit.
        }

        let reread = store.sale(campaign_id, sale.sale_id).await.unwrap().unwrap();
        assert_eq!(reread.total_minor, 0);
    }

    #[tokio::test]
    async fn committed_session_is_atomic_and_visible() {
        let store = InMemorySalesStore::new();
        let campaign_id = CampaignId::new();
        let sale = draft_sale(campaign_id);
        store.insert_sale(&sale).await.unwrap();

        let mut session = store.begin().await.unwrap();
        let mut updated = session
            .sale_for_update(campaign_id, sale.sale_id)
            .await
            .unwrap()
            .unwrap();
        updated.total_minor = 1200;
        session.update_sale(&updated).await.unwrap();
        session
            .insert_outbox_message(&OutboxMessage::pending(
                Utc::now(),
                "sales.sale_completed.v1",
                sale.sale_id,
                campaign_id,
                Uuid::now_v7(),
                "{}".to_string(),
            ))
            .await
            .unwrap();
        session.commit().await.unwrap();

        let reread = store.sale(campaign_id, sale.sale_id).await.unwrap().unwrap();
        assert_eq!(reread.total_minor, 1200);
        assert_eq!(store.unpublished_messages(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_bookkeeping_updates_rows() {
        let store = InMemorySalesStore::new();
        let campaign_id = CampaignId::new();
        let message = OutboxMessage::pending(
            Utc::now(),
            "sales.sale_completed.v1",
            SaleId::new(),
            campaign_id,
            Uuid::now_v7(),
            "{}".to_string(),
        );

        let mut session = store.begin().await.unwrap();
        session.insert_outbox_message(&message).await.unwrap();
        session.commit().await.unwrap();

        store
            .record_publish_failure(message.outbox_message_id, "broker down")
            .await
            .unwrap();
        let pending = store.unpublished_messages(10).await.unwrap();
        assert_eq!(pending[0].publish_attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("broker down"));

        store
            .mark_published(message.outbox_message_id, Utc::now())
            .await
            .unwrap();
        assert!(store.unpublished_messages(10).await.unwrap().is_empty());
        let snapshot = store.outbox_snapshot();
        assert!(snapshot[0].published_at.is_some());
        assert!(snapshot[0].last_error.is_none());
    }
}
