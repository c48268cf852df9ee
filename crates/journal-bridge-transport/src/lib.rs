//! Transport layer for the relay connection.
//!
//! Provides:
//! - Wire protocol (Engine.IO + Socket.IO text packets)
//! - Typed inbound/outbound events
//! - Session handle for emitting events
//! - Reconnecting WebSocket session (feature: websocket)

pub mod protocol;
pub mod session;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{InboundEvent, OutboundEvent, TransportEvent};
pub use session::{SendError, SessionHandle};

#[cfg(feature = "websocket")]
pub use websocket::{ReconnectPolicy, SessionConfig, TransportError, WebSocketSession};
