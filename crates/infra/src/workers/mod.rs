//! Background workers: the outbox publisher (sales side) and the
//! sale-completed consumer (inventory side).
//!
//! Both are single, long-running polling loops; each processes one outbox
//! row / one inbound message fully before moving on. Cross-process races on
//! the same rows are serialized by the store transaction around each unit of
//! work, not by anything in here.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::BrokerError;
use crate::error::StoreError;

pub mod consumer;
pub mod publisher;

pub use consumer::{ConsumerConfig, PollOutcome, SaleCompletedConsumer};
pub use publisher::{OutboxPublisher, PublisherConfig, backoff_delay};

/// Error from one worker cycle. Always transient from the loop's point of
/// view: log, pause, poll again.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: watch::Sender<bool>, join: JoinHandle<()>) -> Self {
        Self { shutdown, join }
    }

    /// Request graceful shutdown and wait for the worker to stop. The worker
    /// finishes (or rolls back) its in-flight unit of work first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

/// Sleep cooperatively; returns true when shutdown was requested instead of
/// the duration elapsing.
pub(crate) async fn sleep_or_shutdown(
    shutdown: &mut watch::Receiver<bool>,
    duration: Duration,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => true,
    }
}
