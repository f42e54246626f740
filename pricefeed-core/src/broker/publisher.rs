use super::{BrokerError, BrokerTransport};
use crate::config::PipelineConfig;
use bytes::Bytes;
use pricefeed_sdk::PriceEvent;
use pricefeed_sdk::codec::broker_json;
use std::sync::Arc;
use tracing::debug;

/// Publishes price events as JSON to a fanout exchange.
#[derive(Clone)]
pub struct BrokerPublisher {
    transport: Arc<dyn BrokerTransport>,
    exchange: String,
}

impl BrokerPublisher {
    /// Declare the configured exchange and return a publisher for it.
    pub async fn declare(
        transport: Arc<dyn BrokerTransport>,
        config: &PipelineConfig,
    ) -> Result<Self, BrokerError> {
        transport.declare_fanout(&config.exchange).await?;
        Ok(Self {
            transport,
            exchange: config.exchange.clone(),
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Broadcast `event` to every queue bound to the exchange.
    ///
    /// Nothing is sent if the event cannot be encoded.
    pub async fn publish(&self, event: &PriceEvent) -> Result<(), BrokerError> {
        let body = broker_json::encode(event)?;
        self.transport
            .publish(&self.exchange, Bytes::from(body))
            .await?;
        debug!(exchange = %self.exchange, event = %event, "Published price event to broker");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::utils::shutdown::shutdown_channel;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_sends_json_body() {
        let broker = Arc::new(MemoryBroker::new());
        let config = PipelineConfig::default();
        let publisher = BrokerPublisher::declare(broker.clone(), &config).await.unwrap();
        broker.bind_queue("price_0", "price").await.unwrap();

        let id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        publisher.publish(&PriceEvent::new(id, 9.99)).await.unwrap();

        let (_tx, mut rx) = shutdown_channel();
        let delivery = broker.receive("price_0", &mut rx).await.unwrap().unwrap();
        assert_eq!(
            delivery.body,
            Bytes::from_static(br#"{"id":"11111111-1111-1111-1111-111111111111","price":9.99}"#)
        );
    }

    #[tokio::test]
    async fn test_non_finite_price_is_not_published() {
        let broker = Arc::new(MemoryBroker::new());
        let publisher = BrokerPublisher::declare(broker.clone(), &PipelineConfig::default())
            .await
            .unwrap();
        broker.bind_queue("price_0", "price").await.unwrap();

        let result = publisher
            .publish(&PriceEvent::new(Uuid::new_v4(), f64::INFINITY))
            .await;
        assert!(matches!(result, Err(BrokerError::Encode(_))));
        assert_eq!(broker.pending("price_0").await, Some(0));
    }
}
