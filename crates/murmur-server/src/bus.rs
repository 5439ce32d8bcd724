//! Bus publishers.
//!
//! Sessions publish through a bounded local queue drained by a background task,
//! so a slow or unreachable broker never stalls a client. A full queue or a
//! broker error loses the record; both are logged and counted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use murmur_core::{MemoryBus, PublishError, Publisher};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, trace, warn};

use crate::config::{BusConfig, BusKind};
use crate::metrics;

/// Broker the background worker forwards payloads to.
#[async_trait]
pub trait Broker: Send + 'static {
    /// Deliver one payload.
    async fn send(&mut self, topic: &str, payload: &[u8]) -> Result<(), String>;
}

#[async_trait]
impl Broker for MultiplexedConnection {
    async fn send(&mut self, topic: &str, payload: &[u8]) -> Result<(), String> {
        let receivers: i64 = self.publish(topic, payload).await.map_err(|e| e.to_string())?;
        trace!(topic = %topic, receivers, "Redis PUBLISH");
        Ok(())
    }
}

#[derive(Debug)]
struct Outgoing {
    topic: String,
    payload: Bytes,
}

/// Publisher that queues payloads for a background broker worker.
#[derive(Debug, Clone)]
pub struct QueuedPublisher {
    tx: mpsc::Sender<Outgoing>,
    name: &'static str,
}

impl QueuedPublisher {
    /// Spawn the worker for `broker` and return the publishing handle.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<B: Broker>(broker: B, queue_capacity: usize, name: &'static str) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(run_worker(broker, rx, name));
        Self { tx, name }
    }
}

async fn run_worker<B: Broker>(mut broker: B, mut rx: mpsc::Receiver<Outgoing>, name: &'static str) {
    while let Some(outgoing) = rx.recv().await {
        if let Err(e) = broker.send(&outgoing.topic, &outgoing.payload).await {
            warn!(bus = name, topic = %outgoing.topic, error = %e, "Broker rejected record");
            metrics::record_publish_failure(&outgoing.topic);
        }
    }
    info!(bus = name, "Publisher worker stopped");
}

impl Publisher for QueuedPublisher {
    fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        let outgoing = Outgoing {
            topic: topic.to_string(),
            payload,
        };

        self.tx.try_send(outgoing).map_err(|e| match e {
            TrySendError::Full(outgoing) => PublishError::QueueFull(outgoing.topic),
            TrySendError::Closed(_) => PublishError::Closed,
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Connect to Redis and start a queued publisher.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the connection fails.
pub async fn connect_redis(url: &str, queue_capacity: usize) -> Result<QueuedPublisher> {
    let client = redis::Client::open(url).with_context(|| format!("Invalid redis URL: {}", url))?;
    let conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to redis")?;

    info!(queue_capacity, "Connected to redis bus");
    Ok(QueuedPublisher::spawn(conn, queue_capacity, "redis"))
}

/// Build the publisher described by configuration.
///
/// # Errors
///
/// Returns an error if the configured broker is unreachable.
pub async fn from_config(config: &BusConfig) -> Result<Arc<dyn Publisher>> {
    match config.kind {
        BusKind::Memory => {
            info!("Publishing to the in-memory bus; records are not persisted");
            Ok(Arc::new(MemoryBus::new()))
        }
        BusKind::Redis => {
            let publisher = connect_redis(&config.redis_url, config.queue_capacity).await?;
            Ok(Arc::new(publisher))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct ChannelBroker(mpsc::UnboundedSender<(String, Vec<u8>)>);

    #[async_trait]
    impl Broker for ChannelBroker {
        async fn send(&mut self, topic: &str, payload: &[u8]) -> Result<(), String> {
            self.0
                .send((topic.to_string(), payload.to_vec()))
                .map_err(|e| e.to_string())
        }
    }

    struct FlakyBroker {
        calls: Arc<AtomicUsize>,
        delivered: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait]
    impl Broker for FlakyBroker {
        async fn send(&mut self, _topic: &str, payload: &[u8]) -> Result<(), String> {
            // Every other call fails
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                return Err("connection reset".to_string());
            }
            let _ = self.delivered.send(payload.to_vec());
            Ok(())
        }
    }

    struct StuckBroker(Arc<Notify>);

    #[async_trait]
    impl Broker for StuckBroker {
        async fn send(&mut self, _topic: &str, _payload: &[u8]) -> Result<(), String> {
            self.0.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_queued_publisher_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let publisher = QueuedPublisher::spawn(ChannelBroker(tx), 8, "test");

        publisher
            .publish("messages", Bytes::from_static(b"m"))
            .unwrap();
        publisher
            .publish("message_keys", Bytes::from_static(b"k"))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), ("messages".to_string(), b"m".to_vec()));
        assert_eq!(
            rx.recv().await.unwrap(),
            ("message_keys".to_string(), b"k".to_vec())
        );
        assert_eq!(publisher.name(), "test");
    }

    #[tokio::test]
    async fn test_broker_errors_do_not_stop_worker() {
        let (delivered, mut rx) = mpsc::unbounded_channel();
        let broker = FlakyBroker {
            calls: Arc::new(AtomicUsize::new(0)),
            delivered,
        };
        let publisher = QueuedPublisher::spawn(broker, 8, "test");

        for payload in [b"1", b"2", b"3", b"4"] {
            publisher
                .publish("messages", Bytes::copy_from_slice(payload))
                .unwrap();
        }

        assert_eq!(rx.recv().await.unwrap(), b"2".to_vec());
        assert_eq!(rx.recv().await.unwrap(), b"4".to_vec());
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        let gate = Arc::new(Notify::new());
        let publisher = QueuedPublisher::spawn(StuckBroker(gate.clone()), 1, "test");

        let failures = (0..3)
            .map(|_| publisher.publish("messages", Bytes::from_static(b"x")))
            .filter(|r| matches!(r, Err(PublishError::QueueFull(_))))
            .count();

        assert!(failures >= 1);
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_memory_bus_from_config() {
        let publisher = from_config(&BusConfig::default()).await.unwrap();
        assert_eq!(publisher.name(), "memory");
    }
}
