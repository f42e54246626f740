//! TOML file configuration structures.
//!
//! These structs directly map to the `pricefeed.toml` file format. Every
//! section is optional; an empty file runs the whole pipeline in memory.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineSection,
    pub relay: RelaySection,
    pub subscriber: SubscriberSection,
    pub catalog: CatalogSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Event log and broker wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// `memory://` or `file:///path/to/log/dir`. In memory when unset.
    pub log_endpoint: Option<Url>,
    pub topic: String,
    /// Only `memory://` is supported. In process when unset.
    pub broker_endpoint: Option<Url>,
    pub exchange: String,
    /// Distinguishes this instance's subscriber queue from other instances'.
    pub consumer_id: String,
    /// `tail`, `beginning`, or a cursor such as `1700000000000-0`.
    pub start: String,
    pub batch_size: usize,
    pub append_timeout_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            log_endpoint: None,
            topic: "price".to_string(),
            broker_endpoint: None,
            exchange: "price".to_string(),
            consumer_id: "0".to_string(),
            start: "tail".to_string(),
            batch_size: 100,
            append_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub enabled: bool,
    pub max_decode_attempts: u32,
    /// Defaults to `<topic>.dead`.
    pub dead_letter_topic: Option<String>,
    /// Keep the relay cursor in memory only when unset.
    pub checkpoint_path: Option<PathBuf>,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_jitter: bool,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_decode_attempts: 3,
            dead_letter_topic: None,
            checkpoint_path: None,
            backoff_initial_ms: 100,
            backoff_max_ms: 30_000,
            backoff_multiplier: 2.0,
            backoff_jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberSection {
    pub enabled: bool,
}

impl Default for SubscriberSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Where catalog writes send their price changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Append to the event log; the relay forwards to the broker.
    #[default]
    Log,
    /// Publish straight to the broker, bypassing the log.
    Broker,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub channel: ChannelKind,
}
