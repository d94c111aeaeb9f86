//! # Envelope codec
//!
//! Every message exchanged with the broker is wrapped in the same JSON envelope:
//!
//! ```json
//! { "eventType": "chassis", "mode": "pwm", "payload": { "fl": 0, "fr": 0, "rl": 0, "rr": 0 } }
//! ```
//!
//! The codec is deliberately lenient on the way in: a missing or `null` payload decodes as an empty
//! object and unknown payload fields are kept untouched.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Payload of an envelope, a JSON object.
pub type Payload = Map<String, Value>;

/// The wire unit of every message sent or received over the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The kind of event carried by this envelope, for example `"chassis"` or `"science"`.
    #[serde(rename = "eventType")]
    pub event_type: String,

    /// Optional mode qualifier, only used by chassis commands (`"pwm"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Event data.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: Payload,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Message is not valid JSON: {0}")]
    MalformedPayload(serde_json::Error),

    #[error("Message is valid JSON but not an envelope: {0}")]
    SchemaMismatch(serde_json::Error),

    #[error("Could not serialize the envelope: {0}")]
    EncodeError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Envelope {
    /// Create a new envelope with no mode.
    pub fn new<S: Into<String>>(event_type: S, payload: Payload) -> Self {
        Self {
            event_type: event_type.into(),
            mode: None,
            payload,
        }
    }

    /// Set the mode of this envelope.
    pub fn with_mode<S: Into<String>>(mut self, mode: S) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Returns true if the payload contains every one of the given keys.
    pub fn has_keys(&self, keys: &[&str]) -> bool {
        keys.iter().all(|k| self.payload.contains_key(*k))
    }

    /// List of the keys present in the payload.
    pub fn payload_keys(&self) -> Vec<String> {
        self.payload.keys().cloned().collect()
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Serialize an envelope into the bytes to be sent over the broker.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(envelope).map_err(CodecError::EncodeError)
}

/// Parse an envelope from bytes received from the broker.
///
/// Bytes which aren't JSON (including invalid UTF-8) give `MalformedPayload`, JSON which doesn't
/// have the envelope's shape gives `SchemaMismatch`.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let value: Value = serde_json::from_slice(bytes).map_err(CodecError::MalformedPayload)?;

    serde_json::from_value(value).map_err(CodecError::SchemaMismatch)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn null_as_empty<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Payload {
        match v {
            Value::Object(m) => m,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_round_trip() {
        let env = Envelope::new(
            "chassis",
            payload(json!({"fl": 10, "fr": -10, "rl": 10, "rr": -255})),
        )
        .with_mode("pwm");

        let bytes = encode(&env).unwrap();
        assert_eq!(decode(&bytes).unwrap(), env);

        let env = Envelope::new("science", Payload::new());
        assert_eq!(decode(&encode(&env).unwrap()).unwrap(), env);
    }

    #[test]
    fn test_missing_payload_is_empty() {
        let env = decode(br#"{"eventType":"science"}"#).unwrap();
        assert_eq!(env.event_type, "science");
        assert!(env.payload.is_empty());
        assert_eq!(env.mode, None);

        let env = decode(br#"{"eventType":"science","payload":null}"#).unwrap();
        assert!(env.payload.is_empty());
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let raw = br#"{"eventType":"science","payload":{"number":1,"extra":{"a":[1,2]}}}"#;
        let env = decode(raw).unwrap();
        assert_eq!(env.payload["extra"], json!({"a": [1, 2]}));

        // And they survive re-encoding
        let again = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(again.payload["extra"], json!({"a": [1, 2]}));
    }

    #[test]
    fn test_malformed() {
        match decode(b"{not json") {
            Err(CodecError::MalformedPayload(_)) => (),
            r => panic!("Expected MalformedPayload, got {:?}", r),
        }

        match decode(&[0xff, 0xfe, 0x00]) {
            Err(CodecError::MalformedPayload(_)) => (),
            r => panic!("Expected MalformedPayload, got {:?}", r),
        }
    }

    #[test]
    fn test_schema_mismatch() {
        match decode(b"[1, 2, 3]") {
            Err(CodecError::SchemaMismatch(_)) => (),
            r => panic!("Expected SchemaMismatch, got {:?}", r),
        }

        match decode(br#"{"payload":{}}"#) {
            Err(CodecError::SchemaMismatch(_)) => (),
            r => panic!("Expected SchemaMismatch, got {:?}", r),
        }
    }

    #[test]
    fn test_has_keys() {
        let env = Envelope::new("science", payload(json!({"a": 1, "b": 2})));
        assert!(env.has_keys(&["a", "b"]));
        assert!(!env.has_keys(&["a", "c"]));
        assert!(env.has_keys(&[]));
    }
}
