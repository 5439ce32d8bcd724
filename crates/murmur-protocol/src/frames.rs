//! Inbound frame types for the Murmur protocol.
//!
//! A frame is one discrete WebSocket message sent by a client. Every data frame
//! carries a single end-to-end-encrypted message together with the encrypted
//! symmetric key for the sending device. The server never decrypts either blob.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a client device.
///
/// Device identifiers are supplied by clients and treated as opaque tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the ID is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An encrypted message as sent by the client.
///
/// Wire format:
///
/// ```json
/// {"device_uuid": "...", "encrypted_text": "...", "encrypted_key": "..."}
/// ```
///
/// Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Device that produced the ciphertext.
    pub device_uuid: DeviceId,
    /// Ciphertext of the message body.
    pub encrypted_text: String,
    /// Ciphertext of the symmetric key, encrypted for `device_uuid`.
    pub encrypted_key: String,
}

impl InboundMessage {
    /// Create a new inbound message.
    #[must_use]
    pub fn new(
        device_uuid: impl Into<DeviceId>,
        encrypted_text: impl Into<String>,
        encrypted_key: impl Into<String>,
    ) -> Self {
        Self {
            device_uuid: device_uuid.into(),
            encrypted_text: encrypted_text.into(),
            encrypted_key: encrypted_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_field_names() {
        let msg = InboundMessage::new("d1", "AAA", "BBB");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["device_uuid"], "d1");
        assert_eq!(value["encrypted_text"], "AAA");
        assert_eq!(value["encrypted_key"], "BBB");
    }

    #[test]
    fn test_device_id_is_transparent() {
        let id: DeviceId = serde_json::from_str("\"phone-7\"").unwrap();
        assert_eq!(id.as_str(), "phone-7");
        assert_eq!(id.to_string(), "phone-7");
        assert!(!id.is_empty());
    }
}
