//! Topic abstraction for the in-process bus.
//!
//! A topic is a named broadcast stream. Publishing never waits for subscribers;
//! a topic with no subscribers drops the payload.

use crate::message::BusMessage;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Maximum topic name length.
pub const MAX_TOPIC_NAME_LENGTH: usize = 256;

/// Default broadcast capacity per topic.
pub(crate) const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Validate a topic name.
///
/// # Errors
///
/// Returns an error message if the topic name is invalid.
pub fn validate_topic_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Topic name cannot be empty");
    }
    if name.len() > MAX_TOPIC_NAME_LENGTH {
        return Err("Topic name too long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && !c.is_ascii_whitespace())
    {
        return Err("Topic name contains invalid characters");
    }
    Ok(())
}

/// A named broadcast stream.
#[derive(Debug)]
pub struct Topic {
    name: String,
    sender: broadcast::Sender<Arc<BusMessage>>,
}

impl Topic {
    /// Create a topic buffering up to `capacity` messages per subscriber.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Get the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribe to this topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BusMessage>> {
        debug!(topic = %self.name, "Subscriber attached");
        self.sender.subscribe()
    }

    /// Publish a payload.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, payload: impl Into<Bytes>) -> usize {
        let msg = Arc::new(BusMessage::new(self.name.clone(), payload));
        trace!(topic = %self.name, sequence = msg.sequence, "Publishing message");
        self.sender.send(msg).unwrap_or_default()
    }
}
