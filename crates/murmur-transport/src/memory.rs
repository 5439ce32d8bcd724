//! In-memory transport.
//!
//! A [`MemoryConnection`] is driven by its paired [`MemoryClient`], which lets
//! tests play the client side of a session without a socket.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, TransportError};

#[derive(Debug)]
enum ClientEvent {
    Frame(Bytes),
    Close,
    Fail(String),
}

/// Create a connected client/server pair.
#[must_use]
pub fn pair() -> (MemoryClient, MemoryConnection) {
    let (tx, rx) = mpsc::unbounded_channel();
    let released = Arc::new(AtomicBool::new(false));

    let client = MemoryClient {
        tx,
        released: released.clone(),
    };
    let conn = MemoryConnection {
        id: ConnectionId::generate(),
        rx,
        released,
        is_open: true,
    };

    (client, conn)
}

/// Client side of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    tx: mpsc::UnboundedSender<ClientEvent>,
    released: Arc<AtomicBool>,
}

impl MemoryClient {
    /// Send a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the server side is gone.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), TransportError> {
        self.push(ClientEvent::Frame(data.into()))
    }

    /// Close the connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if the server side is gone.
    pub fn close(&self) -> Result<(), TransportError> {
        self.push(ClientEvent::Close)
    }

    /// Break the connection with a transport error.
    ///
    /// # Errors
    ///
    /// Returns an error if the server side is gone.
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), TransportError> {
        self.push(ClientEvent::Fail(reason.into()))
    }

    /// Check whether the server side has released the connection.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn push(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.tx
            .send(event)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Server side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<ClientEvent>,
    released: Arc<AtomicBool>,
    is_open: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        match self.rx.recv().await {
            Some(ClientEvent::Frame(data)) => Ok(Some(data)),
            Some(ClientEvent::Fail(reason)) => {
                self.is_open = false;
                Err(TransportError::ReceiveFailed(reason))
            }
            Some(ClientEvent::Close) | None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open = false;
        self.rx.close();
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
