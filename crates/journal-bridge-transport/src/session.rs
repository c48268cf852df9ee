//! Handle for emitting events on the transport session.

use tokio::sync::mpsc;

use crate::protocol::OutboundEvent;

/// Cloneable handle to the live transport session.
///
/// Events emitted while the connection is down are dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl SessionHandle {
    /// Create a handle and the receiver the session drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (Self { outbound_tx }, outbound_rx)
    }

    /// Queue an event for the relay.
    ///
    /// # Errors
    /// Returns error if the session has shut down.
    pub fn emit(&self, event: OutboundEvent) -> Result<(), SendError> {
        self.outbound_tx
            .send(event)
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}
