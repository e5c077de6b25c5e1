//! Redis Streams-backed broker (durable, at-least-once delivery).
//!
//! Mapping onto the abstract topology:
//! - **Exchange + routing key** become one stream per routing key,
//!   `"{exchange}:{routing_key}"` (XADD).
//! - **Queue** becomes a consumer group on that stream (XGROUP/XREADGROUP).
//! - **Ack** is XACK; a nacked delivery simply stays in the group's pending
//!   list and is redelivered on the next read with id `0`.
//!
//! Messages persist in the stream until acknowledged, which gives the same
//! at-least-once contract the workers are written against.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::StreamReadReply;
use tracing::warn;

use super::{Broker, BrokerError, Delivery, Publication, Topology};

#[derive(Debug, Clone)]
struct QueueBinding {
    stream_key: String,
    group: String,
}

pub struct RedisStreamsBroker {
    client: redis::Client,
    connection: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    consumer_name: String,
    /// queue name -> declared binding, filled by `ensure_topology`.
    bindings: Mutex<HashMap<String, QueueBinding>>,
}

impl RedisStreamsBroker {
    /// Create a broker against a Redis URL (e.g. `redis://localhost:6379`).
    pub fn new(redis_url: impl AsRef<str>, consumer_name: impl Into<String>) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            connection: tokio::sync::Mutex::new(None),
            consumer_name: consumer_name.into(),
            bindings: Mutex::new(HashMap::new()),
        })
    }

    fn stream_key(exchange: &str, routing_key: &str) -> String {
        format!("{exchange}:{routing_key}")
    }

    /// Get (or re-establish) the shared multiplexed connection.
    async fn connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection so the next operation reconnects.
    async fn invalidate_connection(&self) {
        let mut cached = self.connection.lock().await;
        *cached = None;
    }

    fn binding_for(&self, queue: &str) -> Result<QueueBinding, BrokerError> {
        self.bindings
            .lock()
            .map_err(|_| BrokerError::Connection("binding lock poisoned".to_string()))?
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::Consume(format!("queue not declared: {queue}")))
    }

    async fn read_one(
        &self,
        binding: &QueueBinding,
        start_id: &str,
    ) -> Result<Option<Delivery>, BrokerError> {
        let mut conn = self.connection().await?;

        let reply: StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&binding.group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(&binding.stream_key)
            .arg(start_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Consume(format!("XREADGROUP failed: {e}")))?;

        for key in reply.keys {
            for entry in key.ids {
                let Some(body) = entry.get::<Vec<u8>>("payload") else {
                    warn!(stream = %binding.stream_key, entry = %entry.id, "stream entry missing payload field");
                    continue;
                };

                return Ok(Some(Delivery {
                    receipt: entry.id,
                    body,
                    redelivered: start_id != ">",
                }));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl Broker for RedisStreamsBroker {
    async fn ensure_topology(&self, topology: &Topology) -> Result<(), BrokerError> {
        let stream_key = Self::stream_key(&topology.exchange, &topology.routing_key);
        let mut conn = self.connection().await?;

        // XGROUP CREATE with MKSTREAM is idempotent apart from the BUSYGROUP
        // error, which means the group already exists.
        let created: Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&stream_key)
            .arg(&topology.queue)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        if let Err(e) = created {
            let already_exists = e
                .code()
                .map(|code| code == "BUSYGROUP")
                .unwrap_or(false);
            if !already_exists {
                self.invalidate_connection().await;
                return Err(BrokerError::Topology(e.to_string()));
            }
        }

        self.bindings
            .lock()
            .map_err(|_| BrokerError::Connection("binding lock poisoned".to_string()))?
            .insert(
                topology.queue.clone(),
                QueueBinding {
                    stream_key,
                    group: topology.queue.clone(),
                },
            );

        Ok(())
    }

    async fn publish(&self, exchange: &str, publication: Publication) -> Result<(), BrokerError> {
        let stream_key = Self::stream_key(exchange, &publication.routing_key);
        let mut conn = self.connection().await?;

        let props = &publication.properties;
        let result: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&stream_key)
            .arg("*")
            .arg("message_id")
            .arg(props.message_id.to_string())
            .arg("correlation_id")
            .arg(props.correlation_id.to_string())
            .arg("event_type")
            .arg(&props.event_type)
            .arg("content_type")
            .arg(&props.content_type)
            .arg("occurred_at")
            .arg(props.occurred_at.to_rfc3339())
            .arg("payload")
            .arg(&publication.body)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.invalidate_connection().await;
                Err(BrokerError::Publish(e.to_string()))
            }
        }
    }

    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let binding = self.binding_for(queue)?;

        // Own pending entries first (delivered but never acked, e.g. after a
        // crash or nack), then new entries.
        match self.read_one(&binding, "0").await {
            Ok(Some(delivery)) => return Ok(Some(delivery)),
            Ok(None) => {}
            Err(e) => {
                self.invalidate_connection().await;
                return Err(e);
            }
        }

        match self.read_one(&binding, ">").await {
            Ok(delivery) => Ok(delivery),
            Err(e) => {
                self.invalidate_connection().await;
                Err(e)
            }
        }
    }

    async fn ack(&self, queue: &str, receipt: &str) -> Result<(), BrokerError> {
        let binding = self.binding_for(queue)?;
        let mut conn = self.connection().await?;

        let result: Result<u64, redis::RedisError> = redis::cmd("XACK")
            .arg(&binding.stream_key)
            .arg(&binding.group)
            .arg(receipt)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.invalidate_connection().await;
                Err(BrokerError::Consume(format!("XACK failed: {e}")))
            }
        }
    }

    async fn nack_requeue(&self, _queue: &str, _receipt: &str) -> Result<(), BrokerError> {
        // Not acking is enough: the entry stays in the group's pending list
        // and the next `get` re-reads it with start id 0.
        Ok(())
    }
}
