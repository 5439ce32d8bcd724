//! Codec for Murmur frames and bus payloads.
//!
//! Inbound frames and outbound bus records are both plain JSON documents. Each
//! WebSocket message carries exactly one frame, so no length prefix is needed.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::frames::InboundMessage;

/// Default maximum frame size (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds the configured maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Frame decoded but is semantically invalid.
    #[error("Invalid frame: {0}")]
    Invalid(&'static str),
}

/// Decode one inbound frame using the default size limit.
///
/// # Errors
///
/// Returns an error if the frame is too large, is not valid JSON for an
/// [`InboundMessage`], or has an empty device identifier.
pub fn decode(data: &[u8]) -> Result<InboundMessage, ProtocolError> {
    decode_with_limit(data, DEFAULT_MAX_FRAME_SIZE)
}

/// Decode one inbound frame, rejecting frames larger than `max_frame_size`.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_with_limit(
    data: &[u8],
    max_frame_size: usize,
) -> Result<InboundMessage, ProtocolError> {
    if data.len() > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: data.len(),
            max: max_frame_size,
        });
    }

    let message: InboundMessage = serde_json::from_slice(data).map_err(ProtocolError::Decode)?;

    if message.device_uuid.is_empty() {
        return Err(ProtocolError::Invalid("device_uuid must not be empty"));
    }

    Ok(message)
}

/// Serialize a record for publication on the bus.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(record: &T) -> Result<Bytes, ProtocolError> {
    serde_json::to_vec(record)
        .map(Bytes::from)
        .map_err(ProtocolError::Encode)
}

/// Frame codec carrying a size limit.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl FrameCodec {
    /// Create a new codec instance with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum accepted frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Get the maximum accepted frame size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Decode one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode(&self, data: &[u8]) -> Result<InboundMessage, ProtocolError> {
        decode_with_limit(data, self.max_frame_size)
    }

    /// Encode a record for the bus.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize + ?Sized>(&self, record: &T) -> Result<Bytes, ProtocolError> {
        encode(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_frame() {
        let frame = br#"{"device_uuid":"d1","encrypted_text":"AAA","encrypted_key":"BBB"}"#;
        let msg = decode(frame).unwrap();
        assert_eq!(msg.device_uuid.as_str(), "d1");
        assert_eq!(msg.encrypted_text, "AAA");
        assert_eq!(msg.encrypted_key, "BBB");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let frame =
            br#"{"device_uuid":"d1","encrypted_text":"A","encrypted_key":"B","extra":true}"#;
        assert!(decode(frame).is_ok());
    }

    #[test]
    fn test_decode_garbage() {
        match decode(b"\x00\xffnot json") {
            Err(ProtocolError::Decode(_)) => {}
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_field() {
        let frame = br#"{"device_uuid":"d1","encrypted_text":"AAA"}"#;
        assert!(matches!(decode(frame), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_empty_device() {
        let frame = br#"{"device_uuid":"","encrypted_text":"AAA","encrypted_key":"BBB"}"#;
        assert!(matches!(decode(frame), Err(ProtocolError::Invalid(_))));
    }

    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::new().with_max_frame_size(16);
        let frame = br#"{"device_uuid":"d1","encrypted_text":"AAA","encrypted_key":"BBB"}"#;

        match codec.decode(frame) {
            Err(ProtocolError::FrameTooLarge { size, max }) => {
                assert_eq!(size, frame.len());
                assert_eq!(max, 16);
            }
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_produces_json() {
        let msg = InboundMessage::new("d1", "AAA", "BBB");
        let bytes = encode(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["encrypted_key"], "BBB");
    }
}
