//! # murmur-core
//!
//! Core types, collaborator ports, and the event bus for the Murmur gateway.
//!
//! This crate provides the building blocks the connection bridge is made of:
//!
//! - **Identity** - Caller identity and the token/authorization ports
//! - **Record** - Message and message-key records built from inbound frames
//! - **Bus** - Fire-and-forget publishing onto named topics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Frame     │────▶│ RecordPair  │────▶│  Publisher  │──▶ messages
//! └─────────────┘     └─────────────┘     └─────────────┘──▶ message_keys
//!                            ▲
//!                            │
//!                     ┌─────────────┐
//!                     │SessionBinding│ (room + sender, fixed per connection)
//!                     └─────────────┘
//! ```

pub mod bus;
pub mod identity;
pub mod ids;
pub mod message;
pub mod record;
pub mod topic;

pub use bus::{topics, BusStats, MemoryBus, PublishError, Publisher};
pub use identity::{extract_bearer, AuthError, Identity, RoomAuthorizer, TokenParser};
pub use ids::{IdError, MessageId, MessageKeyId, RoomId, UserId};
pub use message::BusMessage;
pub use murmur_protocol::{DeviceId, InboundMessage};
pub use record::{MessageKeyRecord, MessageRecord, RecordPair, SessionBinding};
pub use topic::Topic;
