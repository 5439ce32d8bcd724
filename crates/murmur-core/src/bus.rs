//! Event bus publishing.
//!
//! [`Publisher`] is the seam between the gateway and whatever bus carries
//! records downstream. Publishing is fire-and-forget: implementations hand the
//! payload off and return immediately, without waiting for the broker.
//! [`MemoryBus`] is the in-process implementation.

use crate::message::BusMessage;
use crate::topic::{validate_topic_name, Topic, DEFAULT_TOPIC_CAPACITY};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Topic names used by the gateway.
pub mod topics {
    /// Encrypted message records.
    pub const MESSAGES: &str = "messages";
    /// Encrypted message-key records.
    pub const MESSAGE_KEYS: &str = "message_keys";
}

/// Publish errors.
///
/// None of these are retried; a failed publish loses the payload.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Invalid topic name.
    #[error("Invalid topic name: {0}")]
    InvalidTopic(&'static str),

    /// The local send queue is full.
    #[error("Publish queue full for topic: {0}")]
    QueueFull(String),

    /// The publisher has shut down.
    #[error("Publisher closed")]
    Closed,

    /// The record could not be serialized.
    #[error("Failed to encode record: {0}")]
    Encode(String),
}

/// Fire-and-forget publisher onto named topics.
///
/// Implementations must be safe to share between all session tasks and must
/// never block waiting for broker acknowledgment.
pub trait Publisher: Send + Sync {
    /// Hand a payload to the bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload could not be handed off. Delivery
    /// failures after hand-off are not reported to the caller.
    fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;

    /// Get the publisher name (e.g., "memory", "redis").
    fn name(&self) -> &'static str;
}

/// Bus statistics.
#[derive(Debug, Clone)]
pub struct BusStats {
    /// Number of topics that have seen a publish or subscribe.
    pub topic_count: usize,
    /// Total live subscribers across all topics.
    pub total_subscribers: usize,
}

/// In-process topic bus.
///
/// Topics are created on first use. Subscribers receive every payload
/// published after they subscribed.
pub struct MemoryBus {
    topics: DashMap<String, Topic>,
    capacity: usize,
}

impl MemoryBus {
    /// Create a new bus with the default per-topic capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a new bus with a custom per-topic capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        info!(capacity, "Creating in-memory bus");
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to a topic, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic name is invalid.
    pub fn subscribe(
        &self,
        topic: &str,
    ) -> Result<broadcast::Receiver<Arc<BusMessage>>, PublishError> {
        validate_topic_name(topic).map_err(PublishError::InvalidTopic)?;

        let entry = self.topics.entry(topic.to_string()).or_insert_with(|| {
            debug!(topic = %topic, "Creating new topic");
            Topic::new(topic, self.capacity)
        });

        Ok(entry.subscribe())
    }

    /// Get bus statistics.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            topic_count: self.topics.len(),
            total_subscribers: self.topics.iter().map(|t| t.subscriber_count()).sum(),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for MemoryBus {
    fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        validate_topic_name(topic).map_err(PublishError::InvalidTopic)?;

        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic, self.capacity));

        let count = entry.publish(payload);
        trace!(topic = %topic, recipients = count, "Published to memory bus");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_publish_subscribe() {
        let bus = MemoryBus::new();
        let mut rx1 = bus.subscribe(topics::MESSAGES).unwrap();
        let mut rx2 = bus.subscribe(topics::MESSAGES).unwrap();

        bus.publish(topics::MESSAGES, Bytes::from_static(b"hello"))
            .unwrap();

        assert_eq!(&rx1.recv().await.unwrap().payload[..], b"hello");
        assert_eq!(&rx2.recv().await.unwrap().payload[..], b"hello");
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = MemoryBus::new();
        let mut messages = bus.subscribe(topics::MESSAGES).unwrap();
        let mut keys = bus.subscribe(topics::MESSAGE_KEYS).unwrap();

        bus.publish(topics::MESSAGE_KEYS, Bytes::from_static(b"key"))
            .unwrap();

        assert!(messages.try_recv().is_err());
        assert_eq!(&keys.try_recv().unwrap().payload[..], b"key");
    }

    #[test]
    fn test_publish_without_subscribers_succeeds() {
        let bus = MemoryBus::new();
        assert!(bus.publish(topics::MESSAGES, Bytes::new()).is_ok());
        assert_eq!(bus.stats().topic_count, 1);
    }

    #[test]
    fn test_invalid_topic() {
        let bus = MemoryBus::new();
        assert!(matches!(
            bus.publish("", Bytes::new()),
            Err(PublishError::InvalidTopic(_))
        ));
        assert!(bus.subscribe("bad topic").is_err());
    }

    #[test]
    fn test_bus_stats() {
        let bus = MemoryBus::new();
        let _rx1 = bus.subscribe(topics::MESSAGES).unwrap();
        let _rx2 = bus.subscribe(topics::MESSAGES).unwrap();
        let _rx3 = bus.subscribe(topics::MESSAGE_KEYS).unwrap();

        let stats = bus.stats();
        assert_eq!(stats.topic_count, 2);
        assert_eq!(stats.total_subscribers, 3);
    }

    #[test]
    fn test_publisher_is_object_safe() {
        let bus: Arc<dyn Publisher> = Arc::new(MemoryBus::new());
        assert_eq!(bus.name(), "memory");
    }
}
