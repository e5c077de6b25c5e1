//! Event envelope shared by all integration events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata wrapper around an integration event payload.
///
/// Identifier fields default to nil UUIDs on deserialization so that a
/// missing field surfaces as a *malformed event* (handled by consumer
/// policy) rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T> {
    #[serde(default)]
    pub event_id: Uuid,

    #[serde(default)]
    pub event_type: String,

    pub occurred_at: DateTime<Utc>,

    #[serde(default)]
    pub campaign_id: Uuid,

    /// Correlation id propagated from the request that caused the event.
    #[serde(default)]
    pub correlation_id: Uuid,

    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        campaign_id: Uuid,
        correlation_id: Uuid,
        data: T,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event_type.into(),
            occurred_at,
            campaign_id,
            correlation_id,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let envelope = EventEnvelope::new(
            "sales.sale_completed.v1",
            Utc::now(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            serde_json::json!({"saleId": "x"}),
        );

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("eventId").is_some());
        assert!(json.get("correlationId").is_some());
        assert!(json.get("occurredAt").is_some());
        assert_eq!(json["eventType"], "sales.sale_completed.v1");
    }

    #[test]
    fn missing_ids_deserialize_to_nil() {
        let json = serde_json::json!({
            "eventType": "sales.sale_completed.v1",
            "occurredAt": "2026-02-09T09:00:00Z",
            "data": {}
        });

        let envelope: EventEnvelope<serde_json::Value> = serde_json::from_value(json).unwrap();
        assert!(envelope.event_id.is_nil());
        assert!(envelope.campaign_id.is_nil());
    }
}
