//! Cross-service wire contracts.
//!
//! Everything in this crate crosses a process boundary: the event envelope,
//! monetary DTOs, and the integration event payloads published by the sales
//! service. The JSON shape (camelCase) is the compatibility contract; change
//! it only with a new versioned event type.

pub mod envelope;
pub mod money;
pub mod sale_completed;

pub use envelope::EventEnvelope;
pub use money::MoneyDto;
pub use sale_completed::{SALE_COMPLETED_V1, SaleCompletedEvent, SaleCompletedLine};
