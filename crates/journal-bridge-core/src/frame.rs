//! Relay frames.
//!
//! Every payload the relay forwards is a frame: a named, kinded envelope
//! around a JSON object. The relay stamps `meta.agent` with the name of the
//! agent that produced the frame.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Relay message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame name, e.g. `telegram/message`.
    pub name: String,
    /// Frame kind, e.g. `event` or `command`.
    pub kind: String,
    /// Frame payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Relay-provided metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Frame {
    /// Create an empty frame.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            data: Map::new(),
            meta: Map::new(),
        }
    }

    /// Create an empty `event` frame.
    #[must_use]
    pub fn event(name: impl Into<String>) -> Self {
        Self::new("event", name)
    }

    /// Set a data field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Socket event name the relay uses for this frame.
    #[must_use]
    pub fn socket_event_name(&self) -> String {
        format!("{}-{}", self.kind, self.name)
    }

    /// Get a string data field.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Frame decoding error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Field {field} is not a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// A chat message relayed from another agent.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    /// Raw message text.
    pub text: String,
    /// Name of the agent that relayed it, when known.
    pub sender: Option<String>,
    /// Remaining payload fields.
    pub metadata: Map<String, Value>,
}

impl RelayMessage {
    /// Create a message with no sender metadata.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: None,
            metadata: Map::new(),
        }
    }

    /// Extract a message from a relay frame.
    ///
    /// # Errors
    /// Returns error if `data.message` is absent or not a string.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let text = match frame.data.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(FrameError::WrongType {
                    field: "data.message",
                    expected: "string",
                });
            }
            None => return Err(FrameError::MissingField("data.message")),
        };

        let mut metadata = frame.data.clone();
        metadata.remove("message");

        let sender = frame
            .meta
            .get("agent")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            text,
            sender,
            metadata,
        })
    }
}
