//! Configuration module for pricefeed-server.
//!
//! Reads the TOML file, applies CLI overrides, validates, and converts the
//! result into the core crate's [`PipelineConfig`]. Configuration is fixed
//! for the lifetime of the process.

pub mod file;

pub use file::ChannelKind;

use crate::config::file::{FileConfig, PipelineSection, RelaySection};
use pricefeed_core::config::{BackoffConfig, PipelineConfig, RelayConfig, StartPosition};
use pricefeed_core::log;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Fully processed configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub pipeline: PipelineConfig,
    pub channel: ChannelKind,
    pub relay_enabled: bool,
    pub subscriber_enabled: bool,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the pipeline configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content =
            std::fs::read_to_string(&self.config_path).map_err(|source| ConfigError::IoError {
                path: self.config_path.clone(),
                source,
            })?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        build_loaded_config(file_config)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;
    if let Some(endpoint) = &pipeline.log_endpoint {
        if !matches!(endpoint.scheme(), "memory" | "file") {
            return Err(invalid(format!("unsupported log endpoint {endpoint}")));
        }
    }
    if let Some(endpoint) = &pipeline.broker_endpoint {
        if endpoint.scheme() != "memory" {
            return Err(invalid(format!("unsupported broker endpoint {endpoint}")));
        }
    }
    for (name, value) in [
        ("pipeline.topic", &pipeline.topic),
        ("pipeline.exchange", &pipeline.exchange),
        ("pipeline.consumer_id", &pipeline.consumer_id),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(format!("{name} must not be empty")));
        }
    }
    log::validate_topic(&pipeline.topic)
        .map_err(|e| invalid(format!("pipeline.topic: {e}")))?;
    if let Err(e) = pipeline.start.parse::<StartPosition>() {
        return Err(invalid(format!("pipeline.start: {e}")));
    }
    if pipeline.batch_size == 0 {
        return Err(invalid("pipeline.batch_size must be at least 1"));
    }
    if pipeline.append_timeout_ms == 0 {
        return Err(invalid("pipeline.append_timeout_ms must be at least 1"));
    }

    let relay = &config.relay;
    if relay.max_decode_attempts == 0 {
        return Err(invalid("relay.max_decode_attempts must be at least 1"));
    }
    if !(relay.backoff_multiplier.is_finite() && relay.backoff_multiplier >= 1.0) {
        return Err(invalid("relay.backoff_multiplier must be at least 1.0"));
    }
    if relay.backoff_max_ms < relay.backoff_initial_ms {
        return Err(invalid(
            "relay.backoff_max_ms must not be below relay.backoff_initial_ms",
        ));
    }
    if let Some(topic) = &relay.dead_letter_topic {
        log::validate_topic(topic)
            .map_err(|e| invalid(format!("relay.dead_letter_topic: {e}")))?;
    }
    if relay.dead_letter_topic.as_deref() == Some(pipeline.topic.as_str()) {
        return Err(invalid(
            "relay.dead_letter_topic must differ from pipeline.topic",
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    Ok(LoadedConfig {
        listen: file_config.server.listen,
        pipeline: convert_pipeline(file_config.pipeline, file_config.relay.clone())?,
        channel: file_config.catalog.channel,
        relay_enabled: file_config.relay.enabled,
        subscriber_enabled: file_config.subscriber.enabled,
    })
}

fn convert_pipeline(p: PipelineSection, r: RelaySection) -> Result<PipelineConfig, ConfigError> {
    let start = p
        .start
        .parse::<StartPosition>()
        .map_err(|e| invalid(format!("pipeline.start: {e}")))?;
    let relay = RelayConfig {
        backoff: BackoffConfig {
            initial: Duration::from_millis(r.backoff_initial_ms),
            max: Duration::from_millis(r.backoff_max_ms),
            multiplier: r.backoff_multiplier,
            jitter: r.backoff_jitter,
        },
        max_decode_attempts: r.max_decode_attempts,
        dead_letter_topic: r
            .dead_letter_topic
            .unwrap_or_else(|| RelayConfig::for_topic(&p.topic).dead_letter_topic),
        checkpoint_path: r.checkpoint_path,
    };

    Ok(PipelineConfig {
        log_endpoint: p.log_endpoint,
        topic: p.topic,
        broker_endpoint: p.broker_endpoint,
        exchange: p.exchange,
        consumer_id: p.consumer_id,
        start,
        batch_size: p.batch_size,
        append_timeout: Duration::from_millis(p.append_timeout_ms),
        relay,
    })
}
