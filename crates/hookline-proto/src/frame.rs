//! Tunnel frame encoding and decoding.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Maximum accepted frame size in bytes (16 MB).
///
/// Bounds the JSON text before it is parsed; anything larger is rejected
/// without allocation of the decoded payload.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A single correlated message on a tunnel.
///
/// Wire format is a JSON text frame:
///
/// ```json
/// { "req_id": "<uuid>", "payload": "<base64 bytes>" }
/// ```
///
/// The payload carries a raw HTTP/1.1 request (broker to agent) or a raw
/// HTTP/1.1 response (agent to broker); direction is implicit in the
/// transport. Control frames (pings, closes) are not tunnel frames and
/// never reach this codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelFrame {
    /// Correlation id pairing a webhook request with its response.
    pub req_id: String,
    /// Opaque raw HTTP/1.1 bytes.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl TunnelFrame {
    /// Creates a frame for the given correlation id and payload.
    pub fn new(req_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            req_id: req_id.into(),
            payload,
        }
    }

    /// Encodes the frame to its JSON text representation.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialisation(e.to_string()))
    }

    /// Decodes a frame from JSON text.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: text.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let frame = TunnelFrame::new(uuid::Uuid::new_v4().to_string(), b"hello world".to_vec());
        let text = frame.encode().unwrap();
        let decoded = TunnelFrame::decode(&text).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn payload_is_base64_on_the_wire() {
        let frame = TunnelFrame::new("r1", b"abc".to_vec());
        let text = frame.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["req_id"], "r1");
        assert_eq!(value["payload"], "YWJj");
    }

    #[test]
    fn decode_rejects_missing_fields() {
        assert!(TunnelFrame::decode(r#"{"req_id":"r1"}"#).is_err());
        assert!(TunnelFrame::decode("not json").is_err());
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(TunnelFrame::decode(r#"{"req_id":"r1","payload":"@@@"}"#).is_err());
    }

    #[test]
    fn decode_rejects_oversized_frames() {
        let huge = format!(
            r#"{{"req_id":"r1","payload":"{}"}}"#,
            "A".repeat(MAX_FRAME_SIZE + 1)
        );
        assert!(matches!(
            TunnelFrame::decode(&huge),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn empty_payload_roundtrip() {
        let frame = TunnelFrame::new("r2", Vec::new());
        let decoded = TunnelFrame::decode(&frame.encode().unwrap()).unwrap();
        assert!(decoded.payload.is_empty());
    }
}
