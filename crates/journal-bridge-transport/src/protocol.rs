//! Wire protocol for the relay connection.
//!
//! The relay speaks Socket.IO v5 over Engine.IO v4 text frames:
//! an Engine.IO packet is a type digit followed by its payload, and
//! Engine.IO `message` packets carry Socket.IO packets in the same shape.

use journal_bridge_core::{Frame, GraphInfo, RelayMessage};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

/// Outbound readiness event name.
pub const READY_EVENT: &str = "logseq/ready";

/// Outbound graph descriptor event name.
pub const GRAPH_EVENT: &str = "logseq/graph";

/// Relay command event name.
pub const COMMAND_EVENT: &str = "command";

/// Default relay message event name.
pub const DEFAULT_RELAY_EVENT: &str = "event-telegram/message";

/// Protocol error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,
    #[error("Unknown packet type: {0}")]
    UnknownType(char),
    #[error("Unsupported packet type: {0}")]
    Unsupported(char),
    #[error("Malformed packet: {0}")]
    Malformed(String),
    #[error("Unsupported endpoint scheme: {0}")]
    Scheme(String),
}

/// Engine.IO open handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds to wait for a ping before giving up.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Decode a text frame.
    ///
    /// # Errors
    /// Returns error if the frame is empty, has an unknown type or a bad handshake.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let payload = chars.as_str();

        match kind {
            '0' => serde_json::from_str(payload)
                .map(Self::Open)
                .map_err(|e| ProtocolError::Malformed(format!("handshake: {e}"))),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(payload.to_string())),
            '3' => Ok(Self::Pong(payload.to_string())),
            '4' => Ok(Self::Message(payload.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    /// Encode as a text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => format!(
                "0{}",
                json!({
                    "sid": handshake.sid,
                    "upgrades": handshake.upgrades,
                    "pingInterval": handshake.ping_interval,
                    "pingTimeout": handshake.ping_timeout,
                })
            ),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Connect request (client, with auth) or acknowledgement (server).
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    /// The server refused the connection.
    ConnectError(Value),
}

impl SocketPacket {
    /// Decode the payload of an Engine.IO message.
    ///
    /// Namespace prefixes and ack ids are skipped.
    ///
    /// # Errors
    /// Returns error for unknown, binary or ack packets and malformed JSON.
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        let mut chars = payload.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let mut rest = chars.as_str();

        if rest.starts_with('/') {
            rest = rest.split_once(',').map_or("", |(_, tail)| tail);
        }
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        let body = || -> Result<Option<Value>, ProtocolError> {
            if rest.is_empty() {
                return Ok(None);
            }
            serde_json::from_str(rest)
                .map(Some)
                .map_err(|e| ProtocolError::Malformed(e.to_string()))
        };

        match kind {
            '0' => Ok(Self::Connect(body()?)),
            '1' => Ok(Self::Disconnect),
            '2' => {
                let Some(Value::Array(mut items)) = body()? else {
                    return Err(ProtocolError::Malformed("event is not an array".to_string()));
                };
                if items.is_empty() {
                    return Err(ProtocolError::Malformed("event has no name".to_string()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(ProtocolError::Malformed("event name is not a string".to_string()));
                };
                Ok(Self::Event { name, args: items })
            }
            '4' => Ok(Self::ConnectError(body()?.unwrap_or(Value::Null))),
            '3' | '5' | '6' => Err(ProtocolError::Unsupported(kind)),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    /// Encode as an Engine.IO message payload.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Connect(None) => "0".to_string(),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("2{}", Value::Array(items))
            }
            Self::ConnectError(data) => format!("4{data}"),
        }
    }

    /// Wrap in an Engine.IO message packet.
    #[must_use]
    pub fn into_engine(self) -> EnginePacket {
        EnginePacket::Message(self.encode())
    }
}

/// Connect packet carrying the agent token.
#[must_use]
pub fn connect_with_token(token: &str) -> SocketPacket {
    SocketPacket::Connect(Some(json!({ "token": token })))
}

/// Rewrite a relay `http(s)` address into its Socket.IO WebSocket endpoint.
///
/// # Errors
/// Returns error if the scheme is not `http`, `https`, `ws` or `wss`.
pub fn socket_url(server_url: &Url) -> Result<Url, ProtocolError> {
    let scheme = match server_url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ProtocolError::Scheme(other.to_string())),
    };

    let mut url = server_url.clone();
    url.set_scheme(scheme)
        .map_err(|()| ProtocolError::Scheme(scheme.to_string()))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Event delivered by the transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The relay accepted the connection.
    Connected,
    /// The connection was lost; the session is reconnecting.
    Disconnected { reason: String },
    /// A named event with its arguments.
    Event { name: String, args: Vec<Value> },
}

/// Inbound event, decoded by name into a closed set of shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connected,
    Disconnected { reason: String },
    /// A chat message to record.
    RelayMessage(RelayMessage),
    /// A relay command frame, e.g. `identity`.
    Command(Frame),
    /// A subscribed event whose payload did not have the expected shape.
    Malformed { name: String, reason: String },
    /// Any other event.
    Other { name: String, args: Vec<Value> },
}

impl InboundEvent {
    /// Decode a transport event, treating `relay_event` as the message event.
    #[must_use]
    pub fn decode(event: TransportEvent, relay_event: &str) -> Self {
        match event {
            TransportEvent::Connected => Self::Connected,
            TransportEvent::Disconnected { reason } => Self::Disconnected { reason },
            TransportEvent::Event { name, args } if name == relay_event => {
                match first_frame(&args).and_then(|frame| {
                    RelayMessage::from_frame(&frame).map_err(|e| e.to_string())
                }) {
                    Ok(message) => Self::RelayMessage(message),
                    Err(reason) => Self::Malformed { name, reason },
                }
            }
            TransportEvent::Event { name, args } if name == COMMAND_EVENT => {
                match first_frame(&args) {
                    Ok(frame) => Self::Command(frame),
                    Err(reason) => Self::Malformed { name, reason },
                }
            }
            TransportEvent::Event { name, args } => Self::Other { name, args },
        }
    }

    /// Event name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Connected => "connect",
            Self::Disconnected { .. } => "disconnect",
            Self::RelayMessage(_) => "relay-message",
            Self::Command(_) => COMMAND_EVENT,
            Self::Malformed { name, .. } | Self::Other { name, .. } => name.as_str(),
        }
    }
}

fn first_frame(args: &[Value]) -> Result<Frame, String> {
    let payload = args.first().ok_or_else(|| "missing payload".to_string())?;
    Frame::deserialize(payload).map_err(|e| e.to_string())
}

/// Event sent to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Bare readiness signal.
    Ready,
    /// Readiness as a structured frame.
    ReadyEnvelope,
    /// The host's current graph.
    Graph(GraphInfo),
}

impl OutboundEvent {
    /// Socket event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ready | Self::ReadyEnvelope => READY_EVENT,
            Self::Graph(_) => GRAPH_EVENT,
        }
    }

    /// Convert to a Socket.IO event packet.
    #[must_use]
    pub fn to_packet(&self) -> SocketPacket {
        let args = match self {
            Self::Ready => Vec::new(),
            Self::ReadyEnvelope => {
                vec![serde_json::to_value(Frame::event("ready")).unwrap_or(Value::Null)]
            }
            Self::Graph(graph) => vec![serde_json::to_value(graph).unwrap_or(Value::Null)],
        };
        SocketPacket::Event {
            name: self.name().to_string(),
            args,
        }
    }
}
