//! Composition of the price-change pipeline.
//!
//! Opens the log store and broker named in the configuration, wires the
//! catalog to the configured price channel, and spawns the relay and the
//! subscriber as background tasks sharing one shutdown channel.

use crate::config::{ChannelKind, LoadedConfig};
use pricefeed_core::broker::{self, BrokerConsumer, BrokerPublisher};
use pricefeed_core::catalog::{CatalogService, MemoryCatalog};
use pricefeed_core::channel::PriceChannel;
use pricefeed_core::log::{self, CursorCheckpoint, FileCheckpoint, MemoryCheckpoint};
use pricefeed_core::producer::EventProducer;
use pricefeed_core::projection::LatestPrices;
use pricefeed_core::relay::Relay;
use pricefeed_core::utils::shutdown::{ShutdownSender, shutdown_channel};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Pipeline {
    pub catalog: CatalogService,
    pub prices: Arc<LatestPrices>,
    shutdown_tx: ShutdownSender,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

fn endpoint_name(endpoint: Option<&url::Url>) -> &str {
    endpoint.map_or("memory://", |url| url.as_str())
}

impl Pipeline {
    pub async fn start(config: &LoadedConfig) -> anyhow::Result<Self> {
        let pipeline = &config.pipeline;
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let mut tasks = Vec::new();

        let store = log::open_store(pipeline.log_endpoint.as_ref()).await?;
        info!(
            endpoint = endpoint_name(pipeline.log_endpoint.as_ref()),
            topic = %pipeline.topic,
            "Event log opened"
        );
        let transport = broker::connect(pipeline.broker_endpoint.as_ref())?;
        let publisher = BrokerPublisher::declare(transport.clone(), pipeline).await?;
        info!(
            endpoint = endpoint_name(pipeline.broker_endpoint.as_ref()),
            exchange = %pipeline.exchange,
            "Broker connected"
        );

        // Bind before the relay starts so nothing it publishes is missed.
        let prices = Arc::new(LatestPrices::new());
        if config.subscriber_enabled {
            let subscriber =
                BrokerConsumer::bind(transport.clone(), &pipeline.queue_name(), &pipeline.exchange)
                    .await?;
            let handle = tokio::spawn(subscriber.run(
                prices.clone(),
                pipeline.relay.backoff.clone(),
                shutdown_rx.clone(),
            ));
            tasks.push(("subscriber", handle));
        }

        if config.relay_enabled {
            let checkpoint: Arc<dyn CursorCheckpoint> = match &pipeline.relay.checkpoint_path {
                Some(path) => Arc::new(FileCheckpoint::new(path)),
                None => Arc::new(MemoryCheckpoint::new()),
            };
            let relay = Relay::start(store.clone(), publisher.clone(), checkpoint, pipeline).await?;
            tasks.push(("relay", tokio::spawn(relay.run(shutdown_rx.clone()))));
        }

        let channel: Arc<dyn PriceChannel> = match config.channel {
            ChannelKind::Log => Arc::new(EventProducer::new(store, pipeline)),
            ChannelKind::Broker => Arc::new(publisher),
        };
        if config.channel == ChannelKind::Log && !config.relay_enabled {
            warn!("Price events go to the event log but the relay is disabled");
        }
        info!(channel = channel.kind(), "Catalog price channel selected");

        Ok(Self {
            catalog: CatalogService::new(Arc::new(MemoryCatalog::new()), channel),
            prices,
            shutdown_tx,
            tasks,
        })
    }

    /// Signal every background task to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Background task ended abnormally");
            }
        }
        info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use pricefeed_core::catalog::NewItem;
    use std::time::Duration;

    #[tokio::test]
    async fn test_in_memory_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricefeed.toml");
        std::fs::write(&path, "[relay]\nbackoff_jitter = false\n").unwrap();
        let config = ConfigLoader::new(&path, None).load().unwrap();

        let pipeline = Pipeline::start(&config).await.unwrap();
        let item = pipeline
            .catalog
            .create(NewItem {
                name: "Luna".to_string(),
                color: "white".to_string(),
                age: 1,
                price: 9.99,
            })
            .await
            .unwrap();

        let mut observed = None;
        for _ in 0..200 {
            observed = pipeline.prices.get(item.id).await;
            if observed.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(observed, Some(9.99));

        tokio::time::timeout(Duration::from_secs(5), pipeline.shutdown())
            .await
            .unwrap();
    }
}
