//! WebSocket transport implementation.
//!
//! Wraps an axum [`WebSocket`] in the [`Connection`] trait and carries the
//! upgrade policy (buffer sizes, message size limit, origin allow-list).

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::traits::{Connection, ConnectionId, TransportError};

/// WebSocket upgrade configuration.
#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    /// Read buffer capacity in bytes.
    pub read_buffer_size: usize,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Largest frame a session accepts. Larger frames are discarded by the
    /// frame codec without closing the connection.
    pub max_message_size: usize,
    /// Hard cap enforced by the socket itself. A message above it breaks the
    /// connection, so it is never set below `max_message_size`.
    pub socket_message_limit: usize,
    /// Origins allowed to open connections. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            max_message_size: 64 * 1024, // 64 KB
            socket_message_limit: 16 * 1024 * 1024, // 16 MB
            allowed_origins: Vec::new(),
        }
    }
}

impl UpgradeConfig {
    /// Check whether a request `Origin` is acceptable.
    ///
    /// Requests without an `Origin` header (non-browser clients) are accepted.
    #[must_use]
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }

        match origin {
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(origin)),
            None => true,
        }
    }

    /// Message size limit handed to the socket.
    #[must_use]
    pub fn socket_limit(&self) -> usize {
        self.socket_message_limit.max(self.max_message_size)
    }

    /// Apply buffer sizes and the socket limit to a pending upgrade.
    #[must_use]
    pub fn apply(&self, upgrade: WebSocketUpgrade) -> WebSocketUpgrade {
        upgrade
            .read_buffer_size(self.read_buffer_size)
            .write_buffer_size(self.write_buffer_size)
            .max_message_size(self.socket_limit())
    }
}

/// A WebSocket connection established through an axum upgrade.
pub struct WebSocketConnection {
    id: ConnectionId,
    socket: WebSocket,
    remote_addr: Option<String>,
    is_open: bool,
}

impl WebSocketConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
            remote_addr: None,
            is_open: true,
        }
    }

    /// Record the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        loop {
            match self.socket.recv().await {
                Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                    return Ok(Some(msg.into_data()));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are queued by the socket itself
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection = %self.id, close = ?frame, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(()); // Already closed
        }

        self.socket
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_config_default() {
        let config = UpgradeConfig::default();
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.write_buffer_size, 1024);
        assert_eq!(config.max_message_size, 64 * 1024);
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn test_socket_limit_leaves_room_for_oversized_frames() {
        let config = UpgradeConfig::default();
        assert!(config.socket_limit() > config.max_message_size);

        // A misconfigured cap never undercuts the frame limit
        let config = UpgradeConfig {
            max_message_size: 1024 * 1024,
            socket_message_limit: 1024,
            ..Default::default()
        };
        assert_eq!(config.socket_limit(), 1024 * 1024);
    }

    #[test]
    fn test_any_origin_by_default() {
        let config = UpgradeConfig::default();
        assert!(config.origin_allowed(Some("https://evil.example")));
        assert!(config.origin_allowed(None));
    }

    #[test]
    fn test_origin_allow_list() {
        let config = UpgradeConfig {
            allowed_origins: vec!["https://chat.example".to_string()],
            ..Default::default()
        };
        assert!(config.origin_allowed(Some("https://chat.example")));
        assert!(config.origin_allowed(Some("HTTPS://CHAT.EXAMPLE")));
        assert!(!config.origin_allowed(Some("https://evil.example")));
        assert!(config.origin_allowed(None));
    }
}
