//! Records published on the event bus.
//!
//! Each inbound frame yields exactly one [`RecordPair`]: a [`MessageRecord`]
//! holding the ciphertext and a [`MessageKeyRecord`] holding the encrypted key,
//! linked by the message ID.

use chrono::{DateTime, Utc};
use murmur_protocol::{DeviceId, InboundMessage};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, MessageKeyId, RoomId, UserId};

/// Room and sender bound to a connection when it is authorized.
///
/// The binding never changes for the lifetime of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBinding {
    /// Room the connection joined.
    pub room: RoomId,
    /// Authenticated sender.
    pub sender: UserId,
}

impl SessionBinding {
    /// Create a new binding.
    #[must_use]
    pub fn new(room: RoomId, sender: UserId) -> Self {
        Self { room, sender }
    }
}

/// An encrypted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_uuid: MessageId,
    pub room_uuid: RoomId,
    /// `None` is reserved for system messages.
    pub sender_uuid: Option<UserId>,
    pub sender_device_uuid: DeviceId,
    pub encrypted_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The symmetric key of a [`MessageRecord`], encrypted for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeyRecord {
    pub message_key_uuid: MessageKeyId,
    pub message_uuid: MessageId,
    pub device_uuid: DeviceId,
    pub encrypted_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message and its key, built together from one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPair {
    pub message: MessageRecord,
    pub key: MessageKeyRecord,
}

impl RecordPair {
    /// Build the record pair for an inbound message, stamped with the current time.
    #[must_use]
    pub fn build(binding: &SessionBinding, inbound: InboundMessage) -> Self {
        Self::build_at(binding, inbound, Utc::now())
    }

    /// Build the record pair with an explicit creation time.
    #[must_use]
    pub fn build_at(binding: &SessionBinding, inbound: InboundMessage, now: DateTime<Utc>) -> Self {
        let InboundMessage {
            device_uuid,
            encrypted_text,
            encrypted_key,
        } = inbound;

        let message = MessageRecord {
            message_uuid: MessageId::generate(),
            room_uuid: binding.room,
            sender_uuid: Some(binding.sender),
            sender_device_uuid: device_uuid.clone(),
            encrypted_text,
            created_at: now,
            updated_at: now,
        };

        let key = MessageKeyRecord {
            message_key_uuid: MessageKeyId::generate(),
            message_uuid: message.message_uuid,
            device_uuid,
            encrypted_key,
            created_at: now,
            updated_at: now,
        };

        Self { message, key }
    }
}
