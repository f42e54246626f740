use super::{BrokerError, BrokerTransport};
use crate::config::BackoffConfig;
use crate::consumer::PriceHandler;
use crate::utils::backoff::Backoff;
use crate::utils::shutdown::{ShutdownReceiver, wait_for_shutdown};
use pricefeed_sdk::DecodeError;
use pricefeed_sdk::codec::broker_json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DrainError<E> {
    #[error("broker transport error: {0}")]
    Transport(#[source] BrokerError),

    /// The message was already acknowledged and is gone.
    #[error("cannot decode broker message: {0}")]
    Decode(#[source] DecodeError),

    #[error("handler failed: {0}")]
    Handler(#[source] E),
}

/// Subscriber side of the fanout: one durable queue bound to one exchange.
pub struct BrokerConsumer {
    transport: Arc<dyn BrokerTransport>,
    queue: String,
    exchange: String,
}

impl BrokerConsumer {
    /// Declare `exchange`, then declare and bind `queue` to it.
    ///
    /// Only messages published after this returns reach the queue.
    pub async fn bind(
        transport: Arc<dyn BrokerTransport>,
        queue: &str,
        exchange: &str,
    ) -> Result<Self, BrokerError> {
        transport.declare_fanout(exchange).await?;
        transport.bind_queue(queue, exchange).await?;
        info!(queue, exchange, "Subscriber queue bound");
        Ok(Self {
            transport,
            queue: queue.to_string(),
            exchange: exchange.to_string(),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Deliver queued messages to `handler` until the queue closes or
    /// `shutdown` fires, both of which return `Ok`.
    ///
    /// Messages are acknowledged on receipt, so a message whose decode or
    /// handler call fails is not redelivered.
    pub async fn drain<H>(
        &self,
        handler: &H,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<(), DrainError<H::Error>>
    where
        H: PriceHandler + ?Sized,
    {
        loop {
            let delivery = match self.transport.receive(&self.queue, shutdown).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    debug!(queue = %self.queue, "Queue closed");
                    return Ok(());
                }
                Err(BrokerError::Cancelled) => return Ok(()),
                Err(e) => return Err(DrainError::Transport(e)),
            };

            let event = broker_json::decode(&delivery.body).map_err(DrainError::Decode)?;
            debug!(
                queue = %self.queue,
                delivery_tag = delivery.delivery_tag,
                event = %event,
                "Received price event from broker"
            );
            handler.handle(event).await.map_err(DrainError::Handler)?;
        }
    }

    /// Keep draining until shutdown, backing off after transport errors.
    ///
    /// Undecodable messages and handler failures are logged and skipped.
    pub async fn run<H>(
        self,
        handler: Arc<H>,
        backoff: BackoffConfig,
        mut shutdown_rx: ShutdownReceiver,
    ) where
        H: PriceHandler + ?Sized,
    {
        info!(queue = %self.queue, "BrokerConsumer started");
        let mut backoff = Backoff::new(backoff);

        loop {
            match self.drain(handler.as_ref(), &mut shutdown_rx).await {
                Ok(()) => break,
                Err(DrainError::Decode(e)) => {
                    warn!(queue = %self.queue, error = %e, "Dropping undecodable broker message");
                    backoff.reset();
                }
                Err(DrainError::Handler(e)) => {
                    warn!(queue = %self.queue, error = %e, "Handler failed on broker message");
                    backoff.reset();
                }
                Err(DrainError::Transport(e)) => {
                    let delay = backoff.next_delay();
                    error!(
                        queue = %self.queue,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Broker receive failed"
                    );
                    tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut shutdown_rx) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(queue = %self.queue, "BrokerConsumer shutdown complete");
    }
}
