//! Dispatches transport events to the reconciler.

use journal_bridge_core::{DocumentStore, Notifier};
use journal_bridge_journal::Reconciler;
use journal_bridge_transport::{
    InboundEvent, OutboundEvent, SessionHandle, TransportEvent, protocol::DEFAULT_RELAY_EVENT,
};
use tokio::sync::mpsc;

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Socket event carrying messages to record.
    pub relay_event: String,
    /// Announce the current graph after connecting.
    pub announce_graph: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            relay_event: DEFAULT_RELAY_EVENT.to_string(),
            announce_graph: false,
        }
    }
}

/// Routes inbound events, one at a time, to their handlers.
///
/// Each event is handled to completion before the next one is received, so
/// two messages are never reconciled concurrently.
pub struct EventRouter<S, N> {
    reconciler: Reconciler<S, N>,
    session: SessionHandle,
    config: RouterConfig,
}

impl<S, N> EventRouter<S, N>
where
    S: DocumentStore,
    N: Notifier,
{
    /// Create a new router.
    #[must_use]
    pub const fn new(reconciler: Reconciler<S, N>, session: SessionHandle, config: RouterConfig) -> Self {
        Self {
            reconciler,
            session,
            config,
        }
    }

    /// Handle events until the transport closes its channel.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        tracing::info!("Event stream closed");
    }

    /// Handle a single transport event.
    pub async fn dispatch(&self, event: TransportEvent) {
        let event = InboundEvent::decode(event, &self.config.relay_event);
        observe(&event);

        match event {
            InboundEvent::Connected => self.announce_ready().await,
            InboundEvent::Disconnected { reason } => {
                tracing::info!(%reason, "Lost relay connection, waiting for reconnect");
            }
            InboundEvent::RelayMessage(message) => {
                tracing::info!(sender = ?message.sender, "Received relayed message");
                self.reconciler.handle_message_event(&message).await;
            }
            InboundEvent::Command(frame) => {
                tracing::info!(
                    command = %frame.name,
                    agent = frame.data_str("name"),
                    "Received relay command"
                );
            }
            InboundEvent::Malformed { name, reason } => {
                tracing::warn!(event = %name, %reason, "Dropping malformed event");
            }
            InboundEvent::Other { .. } => {}
        }
    }

    async fn announce_ready(&self) {
        tracing::info!("Connected to relay server, announcing readiness");
        self.emit(OutboundEvent::Ready);
        self.emit(OutboundEvent::ReadyEnvelope);

        if !self.config.announce_graph {
            return;
        }
        match self.reconciler.store().current_graph().await {
            Ok(Some(graph)) => self.emit(OutboundEvent::Graph(graph)),
            Ok(None) => tracing::debug!("No graph open, skipping graph announcement"),
            Err(e) => tracing::warn!("Failed to read current graph: {e}"),
        }
    }

    fn emit(&self, event: OutboundEvent) {
        let name = event.name();
        if let Err(e) = self.session.emit(event) {
            tracing::warn!(event = name, "Failed to emit event: {e}");
        }
    }
}

/// Wildcard observer: logs every inbound event.
fn observe(event: &InboundEvent) {
    tracing::debug!(event = event.name(), payload = ?event, "Received event");
}
