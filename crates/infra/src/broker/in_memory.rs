//! In-memory broker for tests and single-process deployments.
//!
//! Implements the full delivery contract (routing by binding, per-queue
//! FIFO, unacked tracking, nack-requeue to the front of the queue) so
//! worker tests exercise the same semantics a real broker provides.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Broker, BrokerError, Delivery, Publication, Topology};

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    /// receipt -> message, awaiting ack/nack.
    unacked: HashMap<String, StoredMessage>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct BrokerState {
    /// (exchange, routing_key) -> bound queues.
    bindings: HashMap<(String, String), Vec<String>>,
    queues: HashMap<String, QueueState>,
    next_receipt: u64,
    /// Test fault injection: while set, every publish fails.
    publish_failing: bool,
}

/// In-memory topic-exchange broker.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail until switched off. Used by tests
    /// to simulate a broker outage.
    pub fn set_publish_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.publish_failing = failing;
        }
    }

    /// Number of messages ready (not in-flight) on a queue.
    pub fn ready_len(&self, queue: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.queues.get(queue).map_or(0, |q| q.ready.len()))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BrokerState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Connection("broker state lock poisoned".to_string()))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn ensure_topology(&self, topology: &Topology) -> Result<(), BrokerError> {
        let mut state = self.lock()?;

        state.queues.entry(topology.queue.clone()).or_default();

        let key = (topology.exchange.clone(), topology.routing_key.clone());
        let bound = state.bindings.entry(key).or_default();
        if !bound.contains(&topology.queue) {
            bound.push(topology.queue.clone());
        }

        Ok(())
    }

    async fn publish(&self, exchange: &str, publication: Publication) -> Result<(), BrokerError> {
        let mut state = self.lock()?;

        if state.publish_failing {
            return Err(BrokerError::Publish("injected publish failure".to_string()));
        }

        let key = (exchange.to_string(), publication.routing_key.clone());
        let queues = state.bindings.get(&key).cloned().unwrap_or_default();

        // A topic exchange with no matching binding drops the message.
        for queue in queues {
            if let Some(q) = state.queues.get_mut(&queue) {
                q.ready.push_back(StoredMessage {
                    body: publication.body.clone(),
                    delivery_count: 0,
                });
            }
        }

        Ok(())
    }

    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.lock()?;
        state.next_receipt += 1;
        let receipt = state.next_receipt.to_string();

        let Some(q) = state.queues.get_mut(queue) else {
            return Err(BrokerError::Consume(format!("unknown queue: {queue}")));
        };

        let Some(mut message) = q.ready.pop_front() else {
            return Ok(None);
        };

        message.delivery_count += 1;
        let delivery = Delivery {
            receipt: receipt.clone(),
            body: message.body.clone(),
            redelivered: message.delivery_count > 1,
        };
        q.unacked.insert(receipt, message);

        Ok(Some(delivery))
    }

    async fn ack(&self, queue: &str, receipt: &str) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        if let Some(q) = state.queues.get_mut(queue) {
            q.unacked.remove(receipt);
        }
        Ok(())
    }

    async fn nack_requeue(&self, queue: &str, receipt: &str) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        if let Some(q) = state.queues.get_mut(queue) {
            if let Some(message) = q.unacked.remove(receipt) {
                // Requeue at the front so redelivery preserves order.
                q.ready.push_front(message);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MessageProperties;
    use chrono::Utc;
    use uuid::Uuid;

    fn topology() -> Topology {
        Topology {
            exchange: "tableshop.events".to_string(),
            queue: "inventory.events".to_string(),
            routing_key: "sales.sale_completed.v1".to_string(),
        }
    }

    fn publication(body: &str) -> Publication {
        Publication {
            routing_key: "sales.sale_completed.v1".to_string(),
            properties: MessageProperties {
                message_id: Uuid::now_v7(),
                correlation_id: Uuid::now_v7(),
                content_type: "application/json".to_string(),
                event_type: "sales.sale_completed.v1".to_string(),
                occurred_at: Utc::now(),
                persistent: true,
            },
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn routes_by_binding_and_acks_remove_messages() {
        let broker = InMemoryBroker::new();
        let topo = topology();
        broker.ensure_topology(&topo).await.unwrap();

        broker
            .publish(&topo.exchange, publication("m1"))
            .await
            .unwrap();

        let delivery = broker.get(&topo.queue).await.unwrap().unwrap();
        assert_eq!(delivery.body, b"m1");
        assert!(!delivery.redelivered);

        broker.ack(&topo.queue, &delivery.receipt).await.unwrap();
        assert!(broker.get(&topo.queue).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_requeues_for_redelivery() {
        let broker = InMemoryBroker::new();
        let topo = topology();
        broker.ensure_topology(&topo).await.unwrap();

        broker
            .publish(&topo.exchange, publication("m1"))
            .await
            .unwrap();

        let first = broker.get(&topo.queue).await.unwrap().unwrap();
        broker
            .nack_requeue(&topo.queue, &first.receipt)
            .await
            .unwrap();

        let second = broker.get(&topo.queue).await.unwrap().unwrap();
        assert_eq!(second.body, b"m1");
        assert!(second.redelivered);
    }

    #[tokio::test]
    async fn unbound_routing_key_drops_message() {
        let broker = InMemoryBroker::new();
        let topo = topology();
        broker.ensure_topology(&topo).await.unwrap();

        let mut other = publication("dropped");
        other.routing_key = "sales.sale_voided.v1".to_string();
        broker.publish(&topo.exchange, other).await.unwrap();

        assert!(broker.get(&topo.queue).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_publish_errors() {
        let broker = InMemoryBroker::new();
        let topo = topology();
        broker.ensure_topology(&topo).await.unwrap();

        broker.set_publish_failing(true);
        let err = broker
            .publish(&topo.exchange, publication("m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Publish(_)));

        broker.set_publish_failing(false);
        broker
            .publish(&topo.exchange, publication("m1"))
            .await
            .unwrap();
        assert_eq!(broker.ready_len(&topo.queue), 1);
    }
}
