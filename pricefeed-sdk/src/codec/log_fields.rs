//! Field-map encoding used by event log records (schema v1).
//!
//! ```text
//! v     = "1"
//! id    = canonical hyphenated UUID
//! price = decimal string, e.g. "9.99"
//! ```
//!
//! Records written before the version field existed carry only `id` and
//! `price`; they are read as version 1. Any other key is rejected.

use super::{DecodeError, EncodeError, parse_id};
use crate::objects::PriceEvent;
use std::collections::BTreeMap;

/// String-keyed value map stored in a log record.
pub type FieldMap = BTreeMap<String, String>;

pub const FIELD_VERSION: &str = "v";
pub const FIELD_ID: &str = "id";
pub const FIELD_PRICE: &str = "price";
pub const SCHEMA_VERSION: &str = "1";

/// Encode an event into the v1 field map.
pub fn encode(event: &PriceEvent) -> Result<FieldMap, EncodeError> {
    if !event.price.is_finite() {
        return Err(EncodeError::NonFinitePrice);
    }

    let mut fields = FieldMap::new();
    fields.insert(FIELD_VERSION.to_string(), SCHEMA_VERSION.to_string());
    fields.insert(FIELD_ID.to_string(), event.id.hyphenated().to_string());
    // `Display` for f64 is the shortest string that parses back to the same value.
    fields.insert(FIELD_PRICE.to_string(), event.price.to_string());
    Ok(fields)
}

/// Decode a field map into an event.
pub fn decode(fields: &FieldMap) -> Result<PriceEvent, DecodeError> {
    if let Some(unknown) = fields
        .keys()
        .find(|k| !matches!(k.as_str(), FIELD_VERSION | FIELD_ID | FIELD_PRICE))
    {
        return Err(DecodeError::UnknownField(unknown.clone()));
    }

    match fields.get(FIELD_VERSION) {
        Some(version) if version != SCHEMA_VERSION => {
            return Err(DecodeError::UnsupportedVersion(version.clone()));
        }
        _ => {}
    }

    let id = fields
        .get(FIELD_ID)
        .ok_or(DecodeError::MissingField(FIELD_ID))?;
    let price = fields
        .get(FIELD_PRICE)
        .ok_or(DecodeError::MissingField(FIELD_PRICE))?;

    let id = parse_id(id)?;
    let price = parse_price(price)?;

    Ok(PriceEvent { id, price })
}

fn parse_price(value: &str) -> Result<f64, DecodeError> {
    let price: f64 = value
        .trim()
        .parse()
        .map_err(|_| DecodeError::InvalidPrice(value.to_string()))?;
    if !price.is_finite() {
        return Err(DecodeError::NonFinitePrice);
    }
    Ok(price)
}
