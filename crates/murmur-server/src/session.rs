//! Per-connection session loop.
//!
//! Once a connection is upgraded, the session reads frames until the client
//! goes away, turning each valid frame into a message/key record pair and
//! handing both to the bus. Bad frames and publish failures are counted and
//! skipped; only the transport, the idle timer or shutdown end the loop.

use futures_util::FutureExt;
use murmur_core::{topics, PublishError, Publisher, RecordPair, SessionBinding};
use murmur_protocol::FrameCodec;
use murmur_transport::{Connection, ConnectionId};
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::gateway::SessionState;
use crate::metrics::{self, ConnectionMetricsGuard};

/// Session settings.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Frame codec, including the size limit.
    pub codec: FrameCodec,
    /// Close the session when no frame arrives for this long.
    pub idle_timeout: Option<Duration>,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the channel.
    ClientClosed,
    /// The channel broke.
    TransportError(String),
    /// No frame within the idle timeout.
    IdleTimeout,
    /// The server is shutting down.
    Shutdown,
    /// The loop body panicked.
    Panicked,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("client closed"),
            Self::TransportError(e) => write!(f, "transport error: {}", e),
            Self::IdleTimeout => f.write_str("idle timeout"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::Panicked => f.write_str("panicked"),
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub connection_id: ConnectionId,
    /// Remote address, when the transport knows it.
    pub peer: Option<String>,
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub pairs_published: u64,
    pub publish_failures: u64,
    pub close_reason: CloseReason,
}

impl SessionReport {
    fn new(connection_id: ConnectionId, peer: Option<String>) -> Self {
        Self {
            connection_id,
            peer,
            frames_received: 0,
            frames_discarded: 0,
            pairs_published: 0,
            publish_failures: 0,
            close_reason: CloseReason::ClientClosed,
        }
    }
}

/// The streaming half of one connection.
pub struct Session {
    binding: SessionBinding,
    publisher: Arc<dyn Publisher>,
    config: SessionConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Session {
    /// Create a session bound to a room and sender.
    #[must_use]
    pub fn new(binding: SessionBinding, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            binding,
            publisher,
            config: SessionConfig::default(),
            shutdown: None,
        }
    }

    /// Set session settings.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Close the session once `shutdown` turns `true`.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Stream frames from `conn` until it closes.
    ///
    /// The connection is closed on every exit path, including a panic in the
    /// loop body.
    pub async fn run<C: Connection>(mut self, mut conn: C) -> SessionReport {
        let _metrics_guard = ConnectionMetricsGuard::new();
        let mut report = SessionReport::new(conn.id().clone(), conn.remote_addr());

        info!(
            connection = %report.connection_id,
            peer = report.peer.as_deref().unwrap_or("-"),
            room = %self.binding.room,
            sender = %self.binding.sender,
            state = %SessionState::Streaming,
            "Session started"
        );

        let outcome = AssertUnwindSafe(self.stream(&mut conn, &mut report))
            .catch_unwind()
            .await;

        report.close_reason = match outcome {
            Ok(reason) => reason,
            Err(_) => {
                error!(connection = %report.connection_id, "Session loop panicked");
                CloseReason::Panicked
            }
        };

        if let Err(e) = conn.close().await {
            debug!(connection = %report.connection_id, error = %e, "Close after session end failed");
        }

        info!(
            connection = %report.connection_id,
            peer = report.peer.as_deref().unwrap_or("-"),
            state = %SessionState::Closed,
            reason = %report.close_reason,
            frames = report.frames_received,
            discarded = report.frames_discarded,
            pairs = report.pairs_published,
            publish_failures = report.publish_failures,
            "Session closed"
        );

        report
    }

    async fn stream<C: Connection>(&mut self, conn: &mut C, report: &mut SessionReport) -> CloseReason {
        loop {
            let received = tokio::select! {
                biased;

                () = wait_for_shutdown(self.shutdown.as_mut()) => return CloseReason::Shutdown,

                () = idle_deadline(self.config.idle_timeout) => {
                    debug!(connection = %report.connection_id, "Idle timeout");
                    return CloseReason::IdleTimeout;
                }

                received = conn.recv() => received,
            };

            match received {
                Ok(Some(data)) => self.handle_frame(&data, report),
                Ok(None) => return CloseReason::ClientClosed,
                Err(e) => {
                    debug!(connection = %report.connection_id, error = %e, "Transport ended session");
                    return CloseReason::TransportError(e.to_string());
                }
            }
        }
    }

    fn handle_frame(&self, data: &[u8], report: &mut SessionReport) {
        let start = Instant::now();
        report.frames_received += 1;
        metrics::record_frame(data.len());

        let inbound = match self.config.codec.decode(data) {
            Ok(inbound) => inbound,
            Err(e) => {
                report.frames_discarded += 1;
                metrics::record_discarded_frame();
                debug!(connection = %report.connection_id, error = %e, "Discarding frame");
                return;
            }
        };

        let pair = RecordPair::build(&self.binding, inbound);

        // Message first, then its key
        let message_ok = self.publish_record(topics::MESSAGES, &pair.message, report);
        let key_ok = self.publish_record(topics::MESSAGE_KEYS, &pair.key, report);
        if message_ok && key_ok {
            report.pairs_published += 1;
        }

        metrics::record_latency(start.elapsed().as_secs_f64());
        debug!(
            connection = %report.connection_id,
            message = %pair.message.message_uuid,
            device = %pair.message.sender_device_uuid,
            "Frame bridged"
        );
    }

    fn publish_record<T: Serialize>(&self, topic: &str, record: &T, report: &mut SessionReport) -> bool {
        let result = self
            .config
            .codec
            .encode(record)
            .map_err(|e| PublishError::Encode(e.to_string()))
            .and_then(|payload| self.publisher.publish(topic, payload));

        match result {
            Ok(()) => {
                metrics::record_publish(topic);
                true
            }
            Err(e) => {
                report.publish_failures += 1;
                metrics::record_publish_failure(topic);
                warn!(
                    connection = %report.connection_id,
                    bus = self.publisher.name(),
                    topic = %topic,
                    error = %e,
                    "Publish failed"
                );
                false
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: Option<&mut watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        let signalled = rx.wait_for(|stop| *stop).await.is_ok();
        if signalled {
            return;
        }
    }
    // No signal, or the sender is gone
    std::future::pending::<()>().await;
}

async fn idle_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending::<()>().await,
    }
}
