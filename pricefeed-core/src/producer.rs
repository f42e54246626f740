//! EventProducer: appends one price-change record per catalog write.
//!
//! Stateless apart from its configuration; safe to share between concurrent
//! request handlers. Per-entity ordering only holds if the caller serializes
//! its own calls for that entity.

use crate::config::PipelineConfig;
use crate::log::{Cursor, LogError, LogStore};
use pricefeed_sdk::codec::log_fields;
use pricefeed_sdk::{EncodeError, PriceEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("cannot encode price event: {0}")]
    Encode(#[from] EncodeError),

    #[error("event log transport error: {0}")]
    Transport(#[from] LogError),
}

#[derive(Clone)]
pub struct EventProducer {
    store: Arc<dyn LogStore>,
    topic: String,
    append_timeout: Duration,
}

impl EventProducer {
    pub fn new(store: Arc<dyn LogStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            topic: config.topic.clone(),
            append_timeout: config.append_timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append `{id, price}` at the tail of the log.
    ///
    /// Bounded by the configured append timeout so the catalog write path
    /// never blocks indefinitely.
    pub async fn append(&self, id: Uuid, price: f64) -> Result<Cursor, ProduceError> {
        self.append_event(&PriceEvent::new(id, price)).await
    }

    pub async fn append_event(&self, event: &PriceEvent) -> Result<Cursor, ProduceError> {
        let fields = log_fields::encode(event)?;
        let cursor = tokio::time::timeout(self.append_timeout, self.store.append(&self.topic, fields))
            .await
            .map_err(|_| LogError::Timeout)??;
        debug!(topic = %self.topic, %cursor, event = %event, "Produced price event to log");
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{FieldMap, LogRecord, MemoryLogStore};
    use crate::utils::shutdown::ShutdownReceiver;
    use async_trait::async_trait;

    #[tokio::test]
    async fn test_append_writes_one_record() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = EventProducer::new(store.clone(), &PipelineConfig::default());

        let id = Uuid::new_v4();
        producer.append(id, 12.5).await.unwrap();

        let records = store.scan("price", &Cursor::start(), 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            log_fields::decode(&records[0].fields).unwrap(),
            PriceEvent::new(id, 12.5)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_all_recorded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<Arc<dyn LogStore>> = vec![
            Arc::new(MemoryLogStore::new()),
            Arc::new(crate::log::FileLogStore::open(dir.path()).await.unwrap()),
        ];

        for store in stores {
            let producer = EventProducer::new(store.clone(), &PipelineConfig::default());
            let tasks: Vec<_> = (0..32)
                .map(|n| {
                    let producer = producer.clone();
                    tokio::spawn(async move { producer.append(Uuid::new_v4(), n as f64).await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            let records = store.scan("price", &Cursor::start(), 100).await.unwrap();
            assert_eq!(records.len(), 32);
            let ids: Vec<_> = records
                .iter()
                .map(|r| crate::log::StreamId::parse(&r.cursor).unwrap())
                .collect();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));

            let mut prices: Vec<f64> = records
                .iter()
                .map(|r| log_fields::decode(&r.fields).unwrap().price)
                .collect();
            prices.sort_by(f64::total_cmp);
            assert_eq!(prices, (0..32).map(f64::from).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_encode_failure_appends_nothing() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = EventProducer::new(store.clone(), &PipelineConfig::default());

        let result = producer.append(Uuid::new_v4(), f64::NAN).await;
        assert!(matches!(result, Err(ProduceError::Encode(_))));
        assert_eq!(store.len("price").await, 0);
    }

    struct StalledStore;

    #[async_trait]
    impl LogStore for StalledStore {
        async fn append(&self, _: &str, _: FieldMap) -> Result<Cursor, LogError> {
            std::future::pending().await
        }
        async fn read_after(
            &self,
            _: &str,
            _: &Cursor,
            _: usize,
            _: &mut ShutdownReceiver,
        ) -> Result<Vec<LogRecord>, LogError> {
            std::future::pending().await
        }
        async fn scan(&self, _: &str, _: &Cursor, _: usize) -> Result<Vec<LogRecord>, LogError> {
            Ok(Vec::new())
        }
        async fn tail(&self, _: &str) -> Result<Cursor, LogError> {
            Ok(Cursor::start())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_is_bounded_by_timeout() {
        let producer = EventProducer::new(Arc::new(StalledStore), &PipelineConfig::default());
        let result = producer.append(Uuid::new_v4(), 1.0).await;
        assert!(matches!(result, Err(ProduceError::Transport(LogError::Timeout))));
    }
}
