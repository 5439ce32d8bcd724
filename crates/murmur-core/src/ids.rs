//! Identifier types.
//!
//! Every server-side identifier is a random 128-bit UUID wrapped in a newtype so
//! a room can never be passed where a user is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when parsing an identifier fails.
#[derive(Debug, Error)]
#[error("Invalid {kind} identifier: {source}")]
pub struct IdError {
    kind: &'static str,
    #[source]
    source: uuid::Error,
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|source| IdError { kind: $kind, source })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a chat room.
    RoomId,
    "room"
);
uuid_id!(
    /// Identifier of a user account.
    UserId,
    "user"
);
uuid_id!(
    /// Identifier of a published message record.
    MessageId,
    "message"
);
uuid_id!(
    /// Identifier of a published message-key record.
    MessageKeyId,
    "message key"
);
