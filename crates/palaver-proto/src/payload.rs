//! Binary payload encoding.
//!
//! JSON has no raw byte representation, so opaque media payloads (Opus
//! audio, encoded screen frames) travel as base64 strings. The codec's
//! frame-size cap applies to the *encoded* form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use crate::error::WireError;

/// Encode raw bytes into a JSON string value.
pub fn encode_payload(bytes: &[u8]) -> Value {
    Value::String(STANDARD.encode(bytes))
}

/// Decode a JSON value carrying a base64 payload.
pub fn decode_payload(value: &Value) -> Result<Vec<u8>, WireError> {
    match value.as_str() {
        Some(s) => decode_payload_str(s),
        None => Err(WireError::PayloadType),
    }
}

/// Decode a base64 string payload.
pub fn decode_payload_str(s: &str) -> Result<Vec<u8>, WireError> {
    Ok(STANDARD.decode(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let data = vec![0u8, 1, 2, 250, 255];
        let encoded = encode_payload(&data);
        assert_eq!(decode_payload(&encoded).unwrap(), data);
    }

    #[test]
    fn rejects_non_string_payload() {
        assert!(decode_payload(&Value::from(17)).is_err());
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(decode_payload(&Value::from("!!not-base64!!")).is_err());
    }
}
