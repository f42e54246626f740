//! JSON encoding used by broker messages: `{"id":"<uuid>","price":<number>}`.

use super::{DecodeError, EncodeError, parse_id};
use crate::objects::{BrokerPriceMessage, PriceEvent};

/// Encode an event into a broker message body.
pub fn encode(event: &PriceEvent) -> Result<Vec<u8>, EncodeError> {
    // serde_json would silently write `null` for NaN.
    if !event.price.is_finite() {
        return Err(EncodeError::NonFinitePrice);
    }
    Ok(serde_json::to_vec(&BrokerPriceMessage::from(event))?)
}

/// Decode a broker message body into an event.
pub fn decode(body: &[u8]) -> Result<PriceEvent, DecodeError> {
    let message: BrokerPriceMessage =
        serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let id = parse_id(&message.id)?;
    if !message.price.is_finite() {
        return Err(DecodeError::NonFinitePrice);
    }
    Ok(PriceEvent {
        id,
        price: message.price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_encode_exact_shape() {
        let event = PriceEvent::new(
            Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
            9.99,
        );
        let body = encode(&event).unwrap();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            r#"{"id":"11111111-1111-1111-1111-111111111111","price":9.99}"#
        );
        assert_eq!(decode(&body).unwrap(), event);
    }

    #[test]
    fn test_decode_integer_price() {
        let event = decode(br#"{"id":"11111111-1111-1111-1111-111111111111","price":10}"#).unwrap();
        assert_eq!(event.price, 10.0);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(br#"{"id":"11111111-1111-1111-1111-111111111111","price":"9.99"}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"id":"11111111-1111-1111-1111-111111111111","price":1,"extra":true}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"id":"nope","price":1}"#),
            Err(DecodeError::InvalidId { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_nan() {
        let event = PriceEvent::new(Uuid::new_v4(), f64::NAN);
        assert!(matches!(encode(&event), Err(EncodeError::NonFinitePrice)));
    }
}
