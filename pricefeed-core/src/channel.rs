//! The "price channel" capability.
//!
//! The catalog write path only needs somewhere to send price changes. Both
//! the event log ([`EventProducer`]) and the fanout broker
//! ([`BrokerPublisher`]) can play that role; which one is used is decided
//! once at composition time.

use crate::broker::{BrokerError, BrokerPublisher};
use crate::producer::{EventProducer, ProduceError};
use async_trait::async_trait;
use pricefeed_sdk::PriceEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceChannelError {
    #[error(transparent)]
    Log(#[from] ProduceError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[async_trait]
pub trait PriceChannel: Send + Sync {
    async fn send(&self, event: &PriceEvent) -> Result<(), PriceChannelError>;

    /// Short name used in logs.
    fn kind(&self) -> &'static str;
}

#[async_trait]
impl PriceChannel for EventProducer {
    async fn send(&self, event: &PriceEvent) -> Result<(), PriceChannelError> {
        self.append_event(event).await?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "log"
    }
}

#[async_trait]
impl PriceChannel for BrokerPublisher {
    async fn send(&self, event: &PriceEvent) -> Result<(), PriceChannelError> {
        self.publish(event).await?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "broker"
    }
}
