//! Configuration value objects for the pipeline.
//!
//! Built once at startup by the binary and passed by parameter into each
//! component constructor. Nothing in this crate reads the environment.

use crate::log::{Cursor, StreamId};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Where the relay begins tailing when no checkpoint exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Only records appended after startup (no historical replay).
    #[default]
    Tail,
    /// Every record ever appended.
    Beginning,
    /// Records strictly after the given cursor.
    At(Cursor),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid start position `{0}`: expected `tail`, `beginning` or a cursor like `1700000000000-0`")]
pub struct InvalidStartPosition(pub String);

impl std::str::FromStr for StartPosition {
    type Err = InvalidStartPosition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tail" | "$" => Ok(StartPosition::Tail),
            "beginning" | "0" => Ok(StartPosition::Beginning),
            other => {
                let cursor = Cursor::new(other);
                match StreamId::parse(&cursor) {
                    Some(_) => Ok(StartPosition::At(cursor)),
                    None => Err(InvalidStartPosition(other.to_string())),
                }
            }
        }
    }
}

/// Retry pacing for transport and handler failures.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Relay-specific settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub backoff: BackoffConfig,
    /// Consecutive decode failures on one record before it is quarantined.
    pub max_decode_attempts: u32,
    /// Log topic receiving quarantined records.
    pub dead_letter_topic: String,
    /// File holding the last forwarded cursor. `None` keeps it in memory only.
    pub checkpoint_path: Option<PathBuf>,
}

impl RelayConfig {
    pub fn for_topic(topic: &str) -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_decode_attempts: 3,
            dead_letter_topic: format!("{topic}.dead"),
            checkpoint_path: None,
        }
    }
}

/// Everything the price-change pipeline needs to know about its surroundings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// `memory://` or `file:///path/to/dir`. `None` keeps the log in process memory.
    pub log_endpoint: Option<Url>,
    /// Log topic carrying price events.
    pub topic: String,
    /// `memory://`. `None` uses the in-process broker.
    pub broker_endpoint: Option<Url>,
    /// Fanout exchange named for the event type.
    pub exchange: String,
    /// Per-instance identifier; determines the subscriber queue name.
    pub consumer_id: String,
    pub start: StartPosition,
    /// Maximum records returned by one long-poll read.
    pub batch_size: usize,
    /// Upper bound on a single append on the catalog write path.
    pub append_timeout: Duration,
    pub relay: RelayConfig,
}

impl PipelineConfig {
    pub const DEFAULT_TOPIC: &str = "price";
    pub const DEFAULT_EXCHANGE: &str = "price";

    /// Durable queue bound by this instance's subscriber.
    pub fn queue_name(&self) -> String {
        format!("{}_{}", self.exchange, self.consumer_id)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_endpoint: None,
            topic: Self::DEFAULT_TOPIC.to_string(),
            broker_endpoint: None,
            exchange: Self::DEFAULT_EXCHANGE.to_string(),
            consumer_id: "0".to_string(),
            start: StartPosition::Tail,
            batch_size: 100,
            append_timeout: Duration::from_secs(5),
            relay: RelayConfig::for_topic(Self::DEFAULT_TOPIC),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_is_deterministic() {
        let config = PipelineConfig {
            consumer_id: "7".to_string(),
            ..PipelineConfig::default()
        };
        assert_eq!(config.queue_name(), "price_7");
        assert_eq!(config.queue_name(), config.clone().queue_name());
    }

    #[test]
    fn test_start_position_parsing() {
        assert_eq!("tail".parse::<StartPosition>().unwrap(), StartPosition::Tail);
        assert_eq!("0".parse::<StartPosition>().unwrap(), StartPosition::Beginning);
        assert_eq!(
            "1700000000000-3".parse::<StartPosition>().unwrap(),
            StartPosition::At(Cursor::new("1700000000000-3"))
        );
    }

    #[test]
    fn test_start_position_rejects_unreadable_cursor() {
        for raw in ["latest", "12-x", ""] {
            assert_eq!(
                raw.parse::<StartPosition>(),
                Err(InvalidStartPosition(raw.to_string()))
            );
        }
    }

    #[test]
    fn test_default_dead_letter_topic() {
        assert_eq!(PipelineConfig::default().relay.dead_letter_topic, "price.dead");
    }
}
