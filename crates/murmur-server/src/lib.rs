//! # Murmur Server
//!
//! Gateway that admits authenticated clients into encrypted chat rooms over
//! WebSocket and bridges every message they send onto the event bus.
//!
//! ## Request flow
//!
//! ```text
//! GET /websocket/{room_uuid}
//!   │
//!   ├─ gateway   credential → identity → room → access    (400 / 403)
//!   ├─ upgrade   origin policy, buffer sizes               (403 / 500)
//!   └─ session   frame → RecordPair → messages, message_keys
//! ```

pub mod access;
pub mod auth;
pub mod bus;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod session;

pub use config::Config;
pub use gateway::{Admission, Gateway, GatewayError, SessionState};
pub use handlers::{router, run_server, serve, AppState};
pub use session::{CloseReason, Session, SessionConfig, SessionReport};
