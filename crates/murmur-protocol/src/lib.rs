//! # murmur-protocol
//!
//! Wire formats for the Murmur encrypted-message gateway.
//!
//! Clients send one JSON [`InboundMessage`] per WebSocket frame. The gateway
//! turns each frame into records that are serialized back to JSON and published
//! on the event bus.
//!
//! ## Example
//!
//! ```rust
//! use murmur_protocol::codec;
//!
//! let frame = br#"{"device_uuid":"d1","encrypted_text":"AAA","encrypted_key":"BBB"}"#;
//! let message = codec::decode(frame).unwrap();
//! assert_eq!(message.encrypted_text, "AAA");
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, FrameCodec, ProtocolError};
pub use frames::{DeviceId, InboundMessage};
