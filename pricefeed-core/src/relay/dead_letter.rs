//! Quarantine for log records that will never decode.
//!
//! A quarantined record is copied into a separate topic of the same log
//! store so the relay can move past it without losing it:
//!
//! ```text
//! source_cursor  = 1700000000000-4
//! error          = invalid identifier `abc`: ...
//! quarantined_at = 2026-01-01T00:00:00Z
//! field.id       = abc
//! field.price    = 9.99
//! ```

use crate::log::{Cursor, FieldMap, LogError, LogRecord, LogStore};
use pricefeed_sdk::DecodeError;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const SOURCE_CURSOR: &str = "source_cursor";
const ERROR: &str = "error";
const QUARANTINED_AT: &str = "quarantined_at";
const FIELD_PREFIX: &str = "field.";

/// A record read back from the dead-letter topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Position in the dead-letter topic.
    pub cursor: Cursor,
    /// Position of the original record in the source topic.
    pub source_cursor: Cursor,
    pub error: String,
    pub quarantined_at: String,
    /// The original record's fields, unchanged.
    pub fields: FieldMap,
}

impl DeadLetter {
    fn from_record(record: LogRecord) -> Self {
        let mut source_cursor = Cursor::start();
        let mut error = String::new();
        let mut quarantined_at = String::new();
        let mut fields = FieldMap::new();

        for (key, value) in record.fields {
            match key.as_str() {
                SOURCE_CURSOR => source_cursor = Cursor::new(value),
                ERROR => error = value,
                QUARANTINED_AT => quarantined_at = value,
                _ => {
                    if let Some(name) = key.strip_prefix(FIELD_PREFIX) {
                        fields.insert(name.to_string(), value);
                    }
                }
            }
        }

        Self {
            cursor: record.cursor,
            source_cursor,
            error,
            quarantined_at,
            fields,
        }
    }
}

#[derive(Clone)]
pub struct DeadLetterQueue {
    store: Arc<dyn LogStore>,
    topic: String,
}

impl DeadLetterQueue {
    pub fn new(store: Arc<dyn LogStore>, topic: impl Into<String>) -> Self {
        Self {
            store,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Copy `record` into the dead-letter topic along with the reason.
    pub async fn quarantine(
        &self,
        record: &LogRecord,
        reason: &DecodeError,
    ) -> Result<Cursor, LogError> {
        let now = OffsetDateTime::now_utc();
        let quarantined_at = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string());

        let mut fields = FieldMap::from([
            (SOURCE_CURSOR.to_string(), record.cursor.to_string()),
            (ERROR.to_string(), reason.to_string()),
            (QUARANTINED_AT.to_string(), quarantined_at),
        ]);
        for (key, value) in &record.fields {
            fields.insert(format!("{FIELD_PREFIX}{key}"), value.clone());
        }

        let cursor = self.store.append(&self.topic, fields).await?;
        error!(
            topic = %self.topic,
            source_cursor = %record.cursor,
            dead_letter_cursor = %cursor,
            error = %reason,
            "Quarantined undecodable record"
        );
        Ok(cursor)
    }

    /// Oldest quarantined records first.
    pub async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>, LogError> {
        let records = self.store.scan(&self.topic, &Cursor::start(), limit).await?;
        Ok(records.into_iter().map(DeadLetter::from_record).collect())
    }
}
