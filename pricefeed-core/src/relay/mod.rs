//! Relay: tails the event log and republishes every event to the broker.
//!
//! The cursor only moves past events the broker accepted, so a publish
//! failure is retried from the same position on the next step. That makes
//! delivery from log to broker at-least-once: a publish whose confirmation
//! is lost is sent again. Subscribers must treat duplicates as no-ops.
//!
//! Only one relay should tail a given topic at a time. Relays do not
//! coordinate with each other and would each publish every event.

pub mod dead_letter;

pub use dead_letter::{DeadLetter, DeadLetterQueue};

use crate::broker::{BrokerError, BrokerPublisher};
use crate::config::{PipelineConfig, RelayConfig};
use crate::consumer::{ConsumeError, ConsumeFailure, LogConsumer, PriceHandler};
use crate::log::{Cursor, CursorCheckpoint, LogError, LogStore};
use crate::utils::backoff::Backoff;
use crate::utils::shutdown::{ShutdownReceiver, is_shutdown, wait_for_shutdown};
use async_trait::async_trait;
use pricefeed_sdk::PriceEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of a single [`Relay::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStep {
    /// A batch was read and every event in it was published.
    Forwarded(usize),
    /// Something failed. Wait this long before the next step.
    Retry(Duration),
    /// A poison record was moved to the dead-letter topic and skipped.
    Quarantined(Cursor),
    /// Shutdown was requested.
    Cancelled,
    /// The log rejected the relay's topic or cursor. Retrying cannot help.
    Fatal(String),
}

/// Publishes each consumed event and counts successes.
struct Forwarder<'a> {
    publisher: &'a BrokerPublisher,
    forwarded: AtomicUsize,
}

#[async_trait]
impl PriceHandler for Forwarder<'_> {
    type Error = BrokerError;

    async fn handle(&self, event: PriceEvent) -> Result<(), BrokerError> {
        self.publisher.publish(&event).await?;
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Decode failures seen at one record position.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Strikes {
    cursor: Cursor,
    count: u32,
}

pub struct Relay {
    consumer: LogConsumer,
    publisher: BrokerPublisher,
    checkpoint: Arc<dyn CursorCheckpoint>,
    dead_letters: DeadLetterQueue,
    backoff: Backoff,
    max_decode_attempts: u32,
    cursor: Cursor,
    strikes: Option<Strikes>,
}

impl Relay {
    /// Build a relay positioned at the saved checkpoint, or at the
    /// configured start position if nothing was saved yet.
    pub async fn start(
        store: Arc<dyn LogStore>,
        publisher: BrokerPublisher,
        checkpoint: Arc<dyn CursorCheckpoint>,
        config: &PipelineConfig,
    ) -> Result<Self, LogError> {
        let consumer = LogConsumer::new(store.clone(), config);
        let RelayConfig {
            backoff,
            max_decode_attempts,
            dead_letter_topic,
            ..
        } = config.relay.clone();

        let cursor = match checkpoint.load().await? {
            Some(saved) => {
                info!(cursor = %saved, "Resuming relay from checkpoint");
                saved
            }
            None => {
                let cursor = consumer.resolve_start(&config.start).await?;
                info!(cursor = %cursor, start = ?config.start, "Starting relay from configured position");
                cursor
            }
        };

        Ok(Self {
            consumer,
            publisher,
            checkpoint,
            dead_letters: DeadLetterQueue::new(store, dead_letter_topic),
            backoff: Backoff::new(backoff),
            max_decode_attempts,
            cursor,
            strikes: None,
        })
    }

    /// Position after the last event known to be published.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    /// Forward one batch. Blocks until records are available.
    pub async fn step(&mut self, shutdown: &mut ShutdownReceiver) -> RelayStep {
        let forwarder = Forwarder {
            publisher: &self.publisher,
            forwarded: AtomicUsize::new(0),
        };
        let result = self.consumer.consume(&self.cursor, &forwarder, shutdown).await;
        let forwarded = forwarder.forwarded.load(Ordering::Relaxed);

        let ConsumeFailure { cursor, error } = match result {
            Ok(next) => {
                self.advance(next).await;
                self.backoff.reset();
                self.strikes = None;
                info!(forwarded, cursor = %self.cursor, "Relayed batch");
                return RelayStep::Forwarded(forwarded);
            }
            Err(failure) => failure,
        };
        if self.advance(cursor).await {
            self.backoff.reset();
        }

        match error {
            ConsumeError::Cancelled => RelayStep::Cancelled,
            ConsumeError::Transport(e) if !e.is_retryable() => {
                error!(error = %e, cursor = %self.cursor, "Event log rejected the relay position, stopping");
                RelayStep::Fatal(e.to_string())
            }
            ConsumeError::Transport(e) => {
                let delay = self.backoff.next_delay();
                error!(error = %e, cursor = %self.cursor, retry_in_ms = delay.as_millis() as u64, "Reading event log failed");
                RelayStep::Retry(delay)
            }
            ConsumeError::Handler(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    error = %e,
                    forwarded,
                    cursor = %self.cursor,
                    retry_in_ms = delay.as_millis() as u64,
                    "Publish failed, batch will be retried from cursor"
                );
                RelayStep::Retry(delay)
            }
            ConsumeError::Decode { record, source } => {
                let count = match &self.strikes {
                    Some(s) if s.cursor == record.cursor => s.count + 1,
                    _ => 1,
                };
                self.strikes = Some(Strikes {
                    cursor: record.cursor.clone(),
                    count,
                });

                if count < self.max_decode_attempts {
                    let delay = self.backoff.next_delay();
                    warn!(
                        record = %record.cursor,
                        error = %source,
                        attempt = count,
                        max_attempts = self.max_decode_attempts,
                        "Undecodable record in event log"
                    );
                    return RelayStep::Retry(delay);
                }

                match self.dead_letters.quarantine(&record, &source).await {
                    Ok(_) => {
                        self.strikes = None;
                        self.backoff.reset();
                        self.advance(record.cursor.clone()).await;
                        RelayStep::Quarantined(record.cursor)
                    }
                    Err(e) if !e.is_retryable() => {
                        error!(record = %record.cursor, error = %e, "Dead-letter topic rejected the record, stopping");
                        RelayStep::Fatal(e.to_string())
                    }
                    Err(e) => {
                        let delay = self.backoff.next_delay();
                        error!(record = %record.cursor, error = %e, "Failed to quarantine record");
                        RelayStep::Retry(delay)
                    }
                }
            }
        }
    }

    /// Move the cursor forward and persist it. Returns whether it moved.
    ///
    /// A failed checkpoint write is not fatal: the worst outcome is that a
    /// restart republishes a few events.
    async fn advance(&mut self, cursor: Cursor) -> bool {
        if cursor == self.cursor {
            return false;
        }
        self.cursor = cursor;
        if let Err(e) = self.checkpoint.save(&self.cursor).await {
            warn!(error = %e, cursor = %self.cursor, "Failed to save relay checkpoint");
        }
        true
    }

    /// Run until shutdown.
    pub async fn run(mut self, mut shutdown_rx: ShutdownReceiver) {
        info!(
            topic = %self.consumer.topic(),
            exchange = %self.publisher.exchange(),
            cursor = %self.cursor,
            "Relay started"
        );

        while !is_shutdown(&shutdown_rx) {
            match self.step(&mut shutdown_rx).await {
                RelayStep::Cancelled | RelayStep::Fatal(_) => break,
                RelayStep::Retry(delay) => {
                    tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut shutdown_rx) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RelayStep::Forwarded(_) | RelayStep::Quarantined(_) => {}
            }
        }

        info!(cursor = %self.cursor, "Relay shutdown complete");
    }
}
