//! Append-only, per-topic event log.
//!
//! The [`LogStore`] trait is the leaf dependency of the pipeline: it appends
//! field maps and hands them back in append order from any cursor. Two
//! backends are provided:
//!
//! - [`MemoryLogStore`]: process-local, for tests and single-process setups.
//! - [`FileLogStore`]: JSON-lines file per topic, survives restarts.

pub mod checkpoint;
mod cursor;
pub mod file;
pub mod memory;

pub use checkpoint::{CursorCheckpoint, FileCheckpoint, MemoryCheckpoint};
pub use cursor::Cursor;
pub use file::FileLogStore;
pub use memory::MemoryLogStore;
pub use pricefeed_sdk::codec::log_fields::FieldMap;

pub(crate) use cursor::{StreamId, now_millis};

use crate::utils::shutdown::ShutdownReceiver;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// One entry of the log. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub cursor: Cursor,
    pub fields: FieldMap,
}

/// Transport-class failures talking to the log.
///
/// All variants except [`LogError::InvalidCursor`] and
/// [`LogError::InvalidTopic`] are worth retrying.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log entry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("log store is closed")]
    Closed,

    #[error("log operation timed out")]
    Timeout,

    #[error("invalid cursor `{0}`")]
    InvalidCursor(Cursor),

    #[error("invalid topic name `{0}`")]
    InvalidTopic(String),

    #[error("unsupported log endpoint `{0}`")]
    UnsupportedEndpoint(Url),

    #[error("read cancelled")]
    Cancelled,
}

/// Storage backend for the event log.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one record at the tail of `topic` and return its cursor.
    async fn append(&self, topic: &str, fields: FieldMap) -> Result<Cursor, LogError>;

    /// Long-poll read of up to `limit` records strictly after `after`.
    ///
    /// Blocks until at least one such record exists. Returns
    /// [`LogError::Cancelled`] as soon as `shutdown` fires.
    async fn read_after(
        &self,
        topic: &str,
        after: &Cursor,
        limit: usize,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<Vec<LogRecord>, LogError>;

    /// Non-blocking variant of [`read_after`](LogStore::read_after); may return nothing.
    async fn scan(&self, topic: &str, after: &Cursor, limit: usize)
    -> Result<Vec<LogRecord>, LogError>;

    /// Cursor of the newest record, or [`Cursor::start`] for an empty topic.
    async fn tail(&self, topic: &str) -> Result<Cursor, LogError>;
}

/// Open the backend named by `endpoint`, or an in-process one for `None`.
pub async fn open_store(endpoint: Option<&Url>) -> Result<Arc<dyn LogStore>, LogError> {
    let Some(endpoint) = endpoint else {
        return Ok(Arc::new(MemoryLogStore::new()));
    };
    match endpoint.scheme() {
        "memory" => Ok(Arc::new(MemoryLogStore::new())),
        "file" => {
            let dir = endpoint
                .to_file_path()
                .map_err(|_| LogError::UnsupportedEndpoint(endpoint.clone()))?;
            Ok(Arc::new(FileLogStore::open(dir).await?))
        }
        _ => Err(LogError::UnsupportedEndpoint(endpoint.clone())),
    }
}

impl LogError {
    /// Whether repeating the same call could ever succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LogError::InvalidCursor(_) | LogError::InvalidTopic(_))
    }
}

/// Topic names double as file names.
pub fn validate_topic(topic: &str) -> Result<(), LogError> {
    let valid = !topic.is_empty()
        && !topic.starts_with('.')
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(LogError::InvalidTopic(topic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topic() {
        assert!(validate_topic("price").is_ok());
        assert!(validate_topic("price.dead").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("../etc").is_err());
        assert!(validate_topic("a/b").is_err());
    }

    #[tokio::test]
    async fn test_open_store_by_scheme() {
        assert!(open_store(None).await.is_ok());
        assert!(open_store(Some(&Url::parse("memory://").unwrap())).await.is_ok());
        assert!(matches!(
            open_store(Some(&Url::parse("redis://localhost:6379").unwrap())).await,
            Err(LogError::UnsupportedEndpoint(_))
        ));
    }
}
