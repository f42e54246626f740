//! Fanout publish/subscribe broker.
//!
//! A fanout exchange copies every published message into each queue bound to
//! it at publish time. Queues are durable for the lifetime of the broker and
//! are named, so a subscriber that reconnects under the same name picks up
//! what accumulated meanwhile.
//!
//! - [`BrokerTransport`]: the seam to a concrete broker.
//! - [`MemoryBroker`]: in-process implementation.
//! - [`BrokerPublisher`] / [`BrokerConsumer`]: price-event level wrappers.

pub mod consumer;
pub mod memory;
pub mod publisher;

pub use consumer::{BrokerConsumer, DrainError};
pub use memory::MemoryBroker;
pub use publisher::BrokerPublisher;

use crate::utils::shutdown::ShutdownReceiver;
use async_trait::async_trait;
use bytes::Bytes;
use pricefeed_sdk::EncodeError;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// A message taken off a queue.
///
/// Receiving a delivery acknowledges it: the broker will not hand it out
/// again, whatever happens to the receiver afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    pub delivery_tag: u64,
    pub body: Bytes,
}

/// Transport-class failures talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("exchange `{0}` has not been declared")]
    UnknownExchange(String),

    #[error("queue `{0}` has not been declared")]
    UnknownQueue(String),

    #[error("broker connection is closed")]
    Closed,

    #[error("broker operation timed out")]
    Timeout,

    #[error("cannot encode message: {0}")]
    Encode(#[from] EncodeError),

    #[error("unsupported broker endpoint `{0}`")]
    UnsupportedEndpoint(Url),

    #[error("broker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("receive cancelled")]
    Cancelled,
}

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Declare a fanout exchange. Declaring an existing exchange is a no-op.
    async fn declare_fanout(&self, exchange: &str) -> Result<(), BrokerError>;

    /// Broadcast `body` to every queue currently bound to `exchange`.
    ///
    /// Fire-and-forget: succeeds even when no queue is bound.
    async fn publish(&self, exchange: &str, body: Bytes) -> Result<(), BrokerError>;

    /// Declare a durable `queue` and bind it to `exchange`. Idempotent.
    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BrokerError>;

    /// Wait for the next message on `queue`.
    ///
    /// Returns `Ok(None)` once the queue can never deliver again.
    async fn receive(
        &self,
        queue: &str,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<Option<Delivery>, BrokerError>;
}

/// Connect to the broker named by `endpoint`, or an in-process one for `None`.
pub fn connect(endpoint: Option<&Url>) -> Result<Arc<dyn BrokerTransport>, BrokerError> {
    match endpoint {
        None => Ok(Arc::new(MemoryBroker::new())),
        Some(url) if url.scheme() == "memory" => Ok(Arc::new(MemoryBroker::new())),
        Some(url) => Err(BrokerError::UnsupportedEndpoint(url.clone())),
    }
}
