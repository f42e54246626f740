//! LogConsumer: tails the event log from a cursor and hands each decoded
//! event to a [`PriceHandler`].
//!
//! The returned cursor only ever moves past records whose handler call
//! succeeded, which gives at-least-once delivery when the caller resumes
//! from it. Handlers must therefore be idempotent.

use crate::config::{PipelineConfig, StartPosition};
use crate::log::{Cursor, LogError, LogRecord, LogStore, StreamId};
use crate::utils::shutdown::ShutdownReceiver;
use async_trait::async_trait;
use pricefeed_sdk::codec::log_fields;
use pricefeed_sdk::{DecodeError, PriceEvent};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Callback invoked once per decoded event.
#[async_trait]
pub trait PriceHandler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(&self, event: PriceEvent) -> Result<(), Self::Error>;
}

#[async_trait]
impl<H: PriceHandler + ?Sized> PriceHandler for Arc<H> {
    type Error = H::Error;

    async fn handle(&self, event: PriceEvent) -> Result<(), Self::Error> {
        (**self).handle(event).await
    }
}

/// Adapts an async closure into a [`PriceHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut, E> PriceHandler for FnHandler<F>
where
    F: Fn(PriceEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    async fn handle(&self, event: PriceEvent) -> Result<(), E> {
        (self.0)(event).await
    }
}

#[derive(Debug, Error)]
pub enum ConsumeError<E> {
    /// The log could not be read. Retry later.
    #[error("event log transport error: {0}")]
    Transport(#[source] LogError),

    /// `record` will never decode. The returned cursor still points before it.
    #[error("cannot decode record {}: {source}", .record.cursor)]
    Decode {
        record: LogRecord,
        #[source]
        source: DecodeError,
    },

    /// The handler rejected an event.
    #[error("handler failed: {0}")]
    Handler(#[source] E),

    /// Shutdown was requested while waiting for records.
    #[error("consume cancelled")]
    Cancelled,
}

/// A failed `consume` call together with the cursor to resume from.
#[derive(Debug, Error)]
#[error("{error} (resume after {cursor})")]
pub struct ConsumeFailure<E> {
    /// Positioned after the last successfully handled record.
    pub cursor: Cursor,
    #[source]
    pub error: ConsumeError<E>,
}

pub struct LogConsumer {
    store: Arc<dyn LogStore>,
    topic: String,
    batch_size: usize,
}

impl LogConsumer {
    pub fn new(store: Arc<dyn LogStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            topic: config.topic.clone(),
            batch_size: config.batch_size,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Turn a configured start position into a concrete cursor.
    ///
    /// `Tail` is resolved against the log as it is right now.
    pub async fn resolve_start(&self, start: &StartPosition) -> Result<Cursor, LogError> {
        match start {
            StartPosition::Tail => self.store.tail(&self.topic).await,
            StartPosition::Beginning => Ok(Cursor::start()),
            StartPosition::At(cursor) if StreamId::parse(cursor).is_some() => Ok(cursor.clone()),
            StartPosition::At(cursor) => Err(LogError::InvalidCursor(cursor.clone())),
        }
    }

    /// Read the next batch after `cursor` and feed it to `handler` in order.
    ///
    /// Blocks until at least one record is available or `shutdown` fires.
    /// On success the returned cursor is positioned after the last record
    /// read. On failure [`ConsumeFailure::cursor`] is positioned after the
    /// last record whose handler call succeeded.
    pub async fn consume<H>(
        &self,
        cursor: &Cursor,
        handler: &H,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<Cursor, ConsumeFailure<H::Error>>
    where
        H: PriceHandler + ?Sized,
    {
        let records = self
            .store
            .read_after(&self.topic, cursor, self.batch_size, shutdown)
            .await
            .map_err(|e| ConsumeFailure {
                cursor: cursor.clone(),
                error: match e {
                    LogError::Cancelled => ConsumeError::Cancelled,
                    other => ConsumeError::Transport(other),
                },
            })?;

        let mut last = cursor.clone();
        for record in records {
            let event = match log_fields::decode(&record.fields) {
                Ok(event) => event,
                Err(source) => {
                    return Err(ConsumeFailure {
                        cursor: last,
                        error: ConsumeError::Decode { record, source },
                    });
                }
            };

            debug!(topic = %self.topic, cursor = %record.cursor, event = %event, "Consumed price event from log");

            if let Err(e) = handler.handle(event).await {
                return Err(ConsumeFailure {
                    cursor: last,
                    error: ConsumeError::Handler(e),
                });
            }
            last = record.cursor;
        }

        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{FieldMap, MemoryLogStore};
    use crate::producer::EventProducer;
    use crate::utils::shutdown::shutdown_channel;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Debug, Error)]
    #[error("rejected {0}")]
    struct Rejected(f64);

    /// Records events and fails on configured prices.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<PriceEvent>>,
        fail_on: Mutex<Option<f64>>,
    }

    impl Recorder {
        fn prices(&self) -> Vec<f64> {
            self.seen.lock().unwrap().iter().map(|e| e.price).collect()
        }
    }

    #[async_trait]
    impl PriceHandler for Recorder {
        type Error = Rejected;

        async fn handle(&self, event: PriceEvent) -> Result<(), Rejected> {
            if *self.fail_on.lock().unwrap() == Some(event.price) {
                return Err(Rejected(event.price));
            }
            self.seen.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryLogStore>,
        producer: EventProducer,
        consumer: LogConsumer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLogStore::new());
        let config = PipelineConfig::default();
        Fixture {
            producer: EventProducer::new(store.clone(), &config),
            consumer: LogConsumer::new(store.clone(), &config),
            store,
        }
    }

    #[tokio::test]
    async fn test_consume_advances_and_never_redelivers() {
        let f = fixture();
        let (_tx, mut rx) = shutdown_channel();
        let recorder = Recorder::default();

        f.producer.append(Uuid::new_v4(), 1.0).await.unwrap();
        f.producer.append(Uuid::new_v4(), 2.0).await.unwrap();

        let position = |c: &Cursor| StreamId::parse(c).unwrap();

        let start = Cursor::start();
        let next = f.consumer.consume(&start, &recorder, &mut rx).await.unwrap();
        assert!(position(&next) > position(&start));
        assert_eq!(recorder.prices(), vec![1.0, 2.0]);

        f.producer.append(Uuid::new_v4(), 3.0).await.unwrap();
        let after = f.consumer.consume(&next, &recorder, &mut rx).await.unwrap();
        assert!(position(&after) > position(&next));
        assert_eq!(recorder.prices(), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_handler_failure_stops_before_failed_record() {
        let f = fixture();
        let (_tx, mut rx) = shutdown_channel();
        let recorder = Recorder::default();
        *recorder.fail_on.lock().unwrap() = Some(3.0);

        let c1 = f.producer.append(Uuid::new_v4(), 1.0).await.unwrap();
        let c2 = f.producer.append(Uuid::new_v4(), 2.0).await.unwrap();
        f.producer.append(Uuid::new_v4(), 3.0).await.unwrap();
        f.producer.append(Uuid::new_v4(), 4.0).await.unwrap();

        let failure = f
            .consumer
            .consume(&Cursor::start(), &recorder, &mut rx)
            .await
            .unwrap_err();
        assert_eq!(failure.cursor, c2);
        assert!(matches!(failure.error, ConsumeError::Handler(Rejected(p)) if p == 3.0));
        assert_eq!(recorder.prices(), vec![1.0, 2.0]);
        assert_ne!(failure.cursor, c1);

        // Resuming redelivers record N and continues.
        *recorder.fail_on.lock().unwrap() = None;
        f.consumer
            .consume(&failure.cursor, &recorder, &mut rx)
            .await
            .unwrap();
        assert_eq!(recorder.prices(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_malformed_record_is_not_handled_or_skipped() {
        let f = fixture();
        let (_tx, mut rx) = shutdown_channel();
        let recorder = Recorder::default();

        let good = f.producer.append(Uuid::new_v4(), 1.0).await.unwrap();
        let bad_fields = FieldMap::from([
            ("id".to_string(), "not-a-uuid".to_string()),
            ("price".to_string(), "1.0".to_string()),
        ]);
        let bad = f.store.append("price", bad_fields).await.unwrap();

        let failure = f
            .consumer
            .consume(&Cursor::start(), &recorder, &mut rx)
            .await
            .unwrap_err();
        assert_eq!(failure.cursor, good);
        match failure.error {
            ConsumeError::Decode { record, source } => {
                assert_eq!(record.cursor, bad);
                assert!(matches!(source, DecodeError::InvalidId { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(recorder.prices(), vec![1.0]);

        // Retrying hits the same record again.
        let again = f.consumer.consume(&good, &recorder, &mut rx).await.unwrap_err();
        assert_eq!(again.cursor, good);
        assert_eq!(recorder.prices(), vec![1.0]);
    }

    #[tokio::test]
    async fn test_non_numeric_price_is_decode_error() {
        let f = fixture();
        let (_tx, mut rx) = shutdown_channel();
        let bad_fields = FieldMap::from([
            ("id".to_string(), Uuid::new_v4().to_string()),
            ("price".to_string(), "ten".to_string()),
        ]);
        f.store.append("price", bad_fields).await.unwrap();

        let handler = FnHandler(|_event: PriceEvent| async { Ok::<(), Rejected>(()) });
        let failure = f
            .consumer
            .consume(&Cursor::start(), &handler, &mut rx)
            .await
            .unwrap_err();
        assert_eq!(failure.cursor, Cursor::start());
        assert!(matches!(
            failure.error,
            ConsumeError::Decode { source: DecodeError::InvalidPrice(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_start_positions() {
        let f = fixture();
        f.producer.append(Uuid::new_v4(), 1.0).await.unwrap();
        let tail = f.producer.append(Uuid::new_v4(), 2.0).await.unwrap();

        assert_eq!(f.consumer.resolve_start(&StartPosition::Tail).await.unwrap(), tail);
        assert_eq!(
            f.consumer.resolve_start(&StartPosition::Beginning).await.unwrap(),
            Cursor::start()
        );
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let f = fixture();
        let (tx, mut rx) = shutdown_channel();
        let recorder = Recorder::default();
        tx.send(true).unwrap();

        let failure = f
            .consumer
            .consume(&Cursor::start(), &recorder, &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ConsumeError::Cancelled));
        assert_eq!(failure.cursor, Cursor::start());
    }
}
