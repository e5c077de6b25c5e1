//! Message broker abstraction (publish/consume mechanics only).
//!
//! The contract is deliberately small: declare topology, publish to a topic
//! exchange by routing key, pull one message at a time from a durable queue,
//! then ack or nack-with-requeue. Delivery is **at-least-once**; the
//! consumer side deduplicates by event id, so redelivery is safe.
//!
//! Implementations: [`in_memory::InMemoryBroker`] for tests and
//! single-process deployments, and (behind the `redis` feature)
//! [`redis_streams::RedisStreamsBroker`] for cross-process delivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

pub use in_memory::InMemoryBroker;
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsBroker;

/// Broker topology: one topic exchange, one durable queue, bound by routing
/// key. The routing key equals the event-type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

/// Message properties carried alongside the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub content_type: String,
    /// Event-type string; also the routing key.
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// Ask the broker for durable storage of this message.
    pub persistent: bool,
}

/// An outbound message.
#[derive(Debug, Clone)]
pub struct Publication {
    pub routing_key: String,
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

/// An inbound message awaiting ack/nack.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Opaque receipt used to ack or nack this delivery.
    pub receipt: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

/// Broker failures. All variants are treated as transient by callers:
/// publishing retries with backoff, consuming pauses and re-polls.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("topology declaration failed: {0}")]
    Topology(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("consume failed: {0}")]
    Consume(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare exchange, queue, and binding (idempotent). Called before every
    /// publish/consume cycle so a reconnected broker is re-declared
    /// automatically.
    async fn ensure_topology(&self, topology: &Topology) -> Result<(), BrokerError>;

    /// Publish one message to the exchange under its routing key.
    async fn publish(&self, exchange: &str, publication: Publication) -> Result<(), BrokerError>;

    /// Pull at most one message from a queue (no prefetch).
    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge a delivery as fully processed.
    async fn ack(&self, queue: &str, receipt: &str) -> Result<(), BrokerError>;

    /// Negatively acknowledge a delivery, requeueing it for redelivery.
    async fn nack_requeue(&self, queue: &str, receipt: &str) -> Result<(), BrokerError>;
}

#[async_trait]
impl<B> Broker for Arc<B>
where
    B: Broker + ?Sized,
{
    async fn ensure_topology(&self, topology: &Topology) -> Result<(), BrokerError> {
        (**self).ensure_topology(topology).await
    }

    async fn publish(&self, exchange: &str, publication: Publication) -> Result<(), BrokerError> {
        (**self).publish(exchange, publication).await
    }

    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        (**self).get(queue).await
    }

    async fn ack(&self, queue: &str, receipt: &str) -> Result<(), BrokerError> {
        (**self).ack(queue, receipt).await
    }

    async fn nack_requeue(&self, queue: &str, receipt: &str) -> Result<(), BrokerError> {
        (**self).nack_requeue(queue, receipt).await
    }
}
