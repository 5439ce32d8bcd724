//! Messages carried by the in-process bus.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sequence counter shared by all in-process topics.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A payload published on a topic.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Monotonic sequence number within this process.
    pub sequence: u64,
    /// Topic the payload was published on.
    pub topic: String,
    /// Serialized record.
    pub payload: Bytes,
    /// Publish time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl BusMessage {
    /// Create a new bus message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
            topic: topic.into(),
            payload: payload.into(),
            timestamp: now_millis(),
        }
    }

    /// Deserialize the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}
