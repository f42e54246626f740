//! The single codec boundary for price events.
//!
//! Two encodings exist:
//!
//! - [`log_fields`]: the string-keyed field map stored in each event log
//!   record. The price travels as a decimal string.
//! - [`broker_json`]: the JSON object published to the fanout exchange.
//!
//! Both reject malformed input deterministically with a [`DecodeError`].

pub mod broker_json;
pub mod log_fields;

use thiserror::Error;

/// A record or message that cannot be turned into a [`PriceEvent`](crate::PriceEvent).
///
/// Decode errors are permanent for the payload that produced them: retrying
/// the same bytes will fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("unsupported schema version `{0}`")]
    UnsupportedVersion(String),

    #[error("invalid identifier `{value}`: {reason}")]
    InvalidId { value: String, reason: String },

    #[error("invalid price `{0}`")]
    InvalidPrice(String),

    #[error("price is not a finite number")]
    NonFinitePrice,

    #[error("malformed message: {0}")]
    Malformed(String),
}

/// An event that cannot be put on the wire.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("price is not a finite number")]
    NonFinitePrice,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn parse_id(value: &str) -> Result<uuid::Uuid, DecodeError> {
    uuid::Uuid::parse_str(value).map_err(|e| DecodeError::InvalidId {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
