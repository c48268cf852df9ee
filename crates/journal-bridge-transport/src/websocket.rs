//! Reconnecting WebSocket session to the relay.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle, time::Instant};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::{self, Message},
};
use url::Url;

use crate::{
    protocol::{
        EnginePacket, Handshake, OutboundEvent, ProtocolError, SocketPacket, TransportEvent,
        connect_with_token, socket_url,
    },
    session::SessionHandle,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("Connection rejected: {0}")]
    Rejected(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Connection closed")]
    Closed,
}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

/// Backoff between reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, and after any successful connection.
    pub initial_delay: Duration,
    /// Upper bound for the doubling delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to use after waiting `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

/// Transport session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay address, e.g. `https://localhost:3965`.
    pub server_url: Url,
    /// Agent token sent with the Socket.IO connect packet.
    pub token: String,
    /// Accept self-signed relay certificates.
    pub accept_invalid_certs: bool,
    pub reconnect: ReconnectPolicy,
}

enum Exit {
    /// The agent side went away; stop for good.
    Shutdown,
    /// The connection dropped after being established.
    Lost(String),
}

/// Persistent, automatically reconnecting relay connection.
///
/// Inbound events are delivered in arrival order on an unbounded channel so
/// a slow consumer never stalls pings.
pub struct WebSocketSession {
    config: SessionConfig,
    socket_url: Url,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>,
}

impl WebSocketSession {
    /// Create a session with its emit handle and inbound event receiver.
    ///
    /// # Errors
    /// Returns error if the server URL cannot be turned into a socket endpoint.
    pub fn new(
        config: SessionConfig,
    ) -> Result<(Self, SessionHandle, mpsc::UnboundedReceiver<TransportEvent>), TransportError>
    {
        let socket_url = socket_url(&config.server_url)?;
        let (handle, outbound_rx) = SessionHandle::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            config,
            socket_url,
            events_tx,
            outbound_rx,
        };
        Ok((session, handle, events_rx))
    }

    /// Run the session on a background task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect, pump events and reconnect until the agent shuts down.
    pub async fn run(mut self) {
        let policy = self.config.reconnect;
        let mut delay = policy.initial_delay;

        loop {
            self.drop_stale_outbound();

            match self.connect_once().await {
                Ok(Exit::Shutdown) => {
                    tracing::info!("Transport session shut down");
                    return;
                }
                Ok(Exit::Lost(reason)) => {
                    tracing::warn!(%reason, "Disconnected from relay server");
                    if self
                        .events_tx
                        .send(TransportEvent::Disconnected { reason })
                        .is_err()
                    {
                        return;
                    }
                    delay = policy.initial_delay;
                }
                Err(e) => {
                    tracing::error!(url = %self.socket_url, "Connection error: {e}");
                }
            }

            if self.events_tx.is_closed() {
                return;
            }

            tracing::debug!(?delay, "Reconnecting");
            tokio::time::sleep(delay).await;
            delay = policy.next_delay(delay);
        }
    }

    fn drop_stale_outbound(&mut self) {
        while let Ok(event) = self.outbound_rx.try_recv() {
            tracing::debug!(event = event.name(), "Dropping event emitted while disconnected");
        }
    }

    fn connector(&self) -> Result<Connector, TransportError> {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(self.config.accept_invalid_certs)
            .danger_accept_invalid_hostnames(self.config.accept_invalid_certs)
            .build()?;
        Ok(Connector::NativeTls(tls))
    }

    async fn connect_once(&mut self) -> Result<Exit, TransportError> {
        tracing::info!(url = %self.socket_url, "Connecting to relay server");

        let (mut ws, _response) = connect_async_tls_with_config(
            self.socket_url.as_str(),
            None,
            false,
            Some(self.connector()?),
        )
        .await?;

        let handshake = match next_packet(&mut ws).await? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {other:?}"
                )));
            }
        };

        ws.send(Message::Text(
            connect_with_token(&self.config.token).into_engine().encode(),
        ))
        .await?;

        loop {
            match next_packet(&mut ws).await? {
                EnginePacket::Message(payload) => match SocketPacket::decode(&payload)? {
                    SocketPacket::Connect(_) => break,
                    SocketPacket::ConnectError(data) => {
                        let reason = data
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unauthorized");
                        return Err(TransportError::Rejected(reason.to_string()));
                    }
                    other => tracing::debug!(?other, "Ignoring packet before connect"),
                },
                EnginePacket::Ping(data) => {
                    ws.send(Message::Text(EnginePacket::Pong(data).encode()))
                        .await?;
                }
                EnginePacket::Close => return Err(TransportError::Closed),
                _ => {}
            }
        }

        tracing::info!(sid = %handshake.sid, "Connected to relay server");
        if self.events_tx.send(TransportEvent::Connected).is_err() {
            return Ok(Exit::Shutdown);
        }

        Ok(self.pump(ws, &handshake).await)
    }

    async fn pump(&mut self, ws: WsStream, handshake: &Handshake) -> Exit {
        let Self {
            events_tx,
            outbound_rx,
            ..
        } = self;
        let (mut sink, mut stream) = ws.split();
        let ping_window =
            Duration::from_millis(handshake.ping_interval.saturating_add(handshake.ping_timeout));
        let mut deadline = Instant::now() + ping_window;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            return Exit::Lost(format!("closed by server: {frame:?}"));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Exit::Lost(e.to_string()),
                        None => return Exit::Lost("stream ended".to_string()),
                    };

                    match EnginePacket::decode(&text) {
                        Ok(EnginePacket::Ping(data)) => {
                            deadline = Instant::now() + ping_window;
                            let pong = EnginePacket::Pong(data).encode();
                            if let Err(e) = sink.send(Message::Text(pong)).await {
                                return Exit::Lost(e.to_string());
                            }
                        }
                        Ok(EnginePacket::Message(payload)) => match SocketPacket::decode(&payload) {
                            Ok(SocketPacket::Event { name, args }) => {
                                if events_tx.send(TransportEvent::Event { name, args }).is_err() {
                                    return Exit::Shutdown;
                                }
                            }
                            Ok(SocketPacket::Disconnect) => {
                                return Exit::Lost("disconnected by server".to_string());
                            }
                            Ok(other) => tracing::debug!(?other, "Ignoring packet"),
                            Err(e) => tracing::warn!("Invalid socket packet: {e}"),
                        },
                        Ok(EnginePacket::Close) => return Exit::Lost("closed by server".to_string()),
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Invalid engine packet: {e}"),
                    }
                }
                event = outbound_rx.recv() => {
                    let Some(event) = event else {
                        let bye = SocketPacket::Disconnect.into_engine().encode();
                        let _ = sink.send(Message::Text(bye)).await;
                        let _ = sink.close().await;
                        return Exit::Shutdown;
                    };
                    let text = event.to_packet().into_engine().encode();
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        return Exit::Lost(e.to_string());
                    }
                    tracing::debug!(event = event.name(), "Emitted event");
                }
                () = tokio::time::sleep_until(deadline) => {
                    return Exit::Lost("ping timeout".to_string());
                }
            }
        }
    }
}

/// Read until the next Engine.IO text packet.
async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, TransportError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> SessionConfig {
        SessionConfig {
            server_url: Url::parse(url).unwrap(),
            token: "secret".to_string(),
            accept_invalid_certs: true,
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, [1, 2, 4, 8, 16, 30, 30]);
    }

    #[tokio::test]
    async fn test_new_session_rewrites_url() {
        let (session, _handle, _events) =
            WebSocketSession::new(config("https://localhost:3965")).unwrap();
        assert_eq!(
            session.socket_url.as_str(),
            "wss://localhost:3965/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_new_session_rejects_bad_scheme() {
        assert!(matches!(
            WebSocketSession::new(config("ftp://localhost:3965")),
            Err(TransportError::Protocol(ProtocolError::Scheme(_)))
        ));
    }

    #[tokio::test]
    async fn test_stale_outbound_events_are_dropped() {
        let (mut session, handle, _events) =
            WebSocketSession::new(config("http://localhost:3965")).unwrap();
        handle.emit(OutboundEvent::Ready).unwrap();
        handle.emit(OutboundEvent::ReadyEnvelope).unwrap();

        session.drop_stale_outbound();
        assert!(session.outbound_rx.try_recv().is_err());
    }
}
