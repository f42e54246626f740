//! Price change event and its broker message shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single price change for one catalog entity.
///
/// Produced once per price-affecting catalog write. Represents the latest
/// known price, not a delta, so applying it twice is harmless.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEvent {
    pub id: Uuid,
    pub price: f64,
}

impl PriceEvent {
    pub fn new(id: Uuid, price: f64) -> Self {
        Self { id, price }
    }
}

impl std::fmt::Display for PriceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}, {}}}", self.id, self.price)
    }
}

/// JSON body published to the fanout exchange.
///
/// The identifier is carried as a plain string so that a malformed one can be
/// reported as such instead of as a generic JSON error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerPriceMessage {
    pub id: String,
    pub price: f64,
}

impl From<&PriceEvent> for BrokerPriceMessage {
    fn from(event: &PriceEvent) -> Self {
        Self {
            id: event.id.hyphenated().to_string(),
            price: event.price,
        }
    }
}
