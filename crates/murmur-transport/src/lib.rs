//! # murmur-transport
//!
//! Transport abstraction layer for the Murmur gateway.
//!
//! This crate provides a unified interface over the channels a session reads
//! frames from:
//!
//! - **WebSocket** - Connections upgraded by axum, plus the upgrade policy
//! - **Memory** - An in-process pair for driving sessions in tests
//!
//! ```rust,ignore
//! use murmur_transport::Connection;
//!
//! async fn drain(mut conn: impl Connection) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Process frame
//!     }
//!     let _ = conn.close().await;
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{UpgradeConfig, WebSocketConnection};
