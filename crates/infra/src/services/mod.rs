//! Application services: orchestration of domain logic over store sessions.
//!
//! Each function here is one unit of work: it opens a session, applies
//! domain rules, and either commits everything or (on any error) drops the
//! session so nothing is persisted.

use thiserror::Error;

use tableshop_core::DomainError;

use crate::error::StoreError;

pub mod inventory;
pub mod sales;

/// Error from an application service: either a deterministic domain failure
/// (mapped to 4xx by the HTTP layer) or an infrastructure failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
