//! Agent settings.
//!
//! Settings come from a TOML file, then environment variables and command
//! line flags (handled by the binary), and are validated once before any
//! connection is attempted.

use std::path::{Path, PathBuf};

use journal_bridge_journal::{
    ReconcilerConfig,
    reconciler::{DEFAULT_ANCHOR_LABEL, DEFAULT_COMMAND_PREFIX},
    storage::http::DEFAULT_API_URL,
};
use journal_bridge_transport::{
    ReconnectPolicy, SessionConfig, protocol::DEFAULT_RELAY_EVENT,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::router::RouterConfig;

/// Default relay server address.
pub const DEFAULT_SERVER_URL: &str = "https://localhost:3965";

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Server URL not configured")]
    MissingServerUrl,
    #[error("Agent token not configured")]
    MissingAgentToken,
    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),
}

impl ConfigError {
    /// Short message for the user-visible notice.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Read { .. } | Self::Parse { .. } => "Please check the journal bridge config file.",
            Self::MissingServerUrl | Self::InvalidServerUrl(_) => {
                "Please configure the server URL."
            }
            Self::MissingAgentToken => "Please configure the agent token.",
        }
    }
}

/// Logseq HTTP API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogseqSettings {
    pub api_url: String,
    pub api_token: Option<String>,
}

impl Default for LogseqSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
        }
    }
}

/// Raw, unvalidated settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Relay server address.
    pub server_url: String,
    /// Token identifying this agent to the relay.
    pub agent_token: String,
    /// Socket event carrying messages to record.
    pub relay_event: String,
    /// Label of the block messages are nested under.
    pub anchor_label: String,
    /// Messages starting with this character are commands.
    pub command_prefix: char,
    /// Announce the current graph after connecting.
    pub announce_graph: bool,
    /// Accept self-signed relay certificates.
    pub accept_invalid_certs: bool,
    pub logseq: LogseqSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            agent_token: String::new(),
            relay_event: DEFAULT_RELAY_EVENT.to_string(),
            anchor_label: DEFAULT_ANCHOR_LABEL.to_string(),
            command_prefix: DEFAULT_COMMAND_PREFIX,
            announce_graph: false,
            accept_invalid_certs: true,
            logseq: LogseqSettings::default(),
        }
    }
}

/// Values from the environment or command line that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub agent_token: Option<String>,
    pub relay_event: Option<String>,
    pub logseq_api_url: Option<String>,
    pub logseq_api_token: Option<String>,
    pub announce_graph: bool,
}

/// Default config file location, `<config dir>/journal-bridge/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("journal-bridge").join("config.toml"))
}

/// Validated settings, ready to start the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub session: SessionConfig,
    pub reconciler: ReconcilerConfig,
    pub router: RouterConfig,
    pub logseq: LogseqSettings,
}

impl Settings {
    /// Load settings from `path`, or from the default location if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&data).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Apply overrides on top of file values.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.server_url {
            self.server_url = url;
        }
        if let Some(token) = overrides.agent_token {
            self.agent_token = token;
        }
        if let Some(event) = overrides.relay_event {
            self.relay_event = event;
        }
        if let Some(url) = overrides.logseq_api_url {
            self.logseq.api_url = url;
        }
        if overrides.logseq_api_token.is_some() {
            self.logseq.api_token = overrides.logseq_api_token;
        }
        self.announce_graph |= overrides.announce_graph;
        self
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    /// Returns error if the text is not valid settings TOML.
    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }

    /// Check required settings and build the agent configuration.
    ///
    /// # Errors
    /// Returns error if the server URL or agent token is missing, or the URL is invalid.
    pub fn validate(self) -> Result<AgentConfig, ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::MissingServerUrl);
        }
        if self.agent_token.trim().is_empty() {
            return Err(ConfigError::MissingAgentToken);
        }
        let server_url = Url::parse(self.server_url.trim())
            .map_err(|e| ConfigError::InvalidServerUrl(e.to_string()))?;
        if !matches!(server_url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ConfigError::InvalidServerUrl(format!(
                "unsupported scheme {}",
                server_url.scheme()
            )));
        }

        Ok(AgentConfig {
            session: SessionConfig {
                server_url,
                token: self.agent_token,
                accept_invalid_certs: self.accept_invalid_certs,
                reconnect: ReconnectPolicy::default(),
            },
            reconciler: ReconcilerConfig {
                anchor_label: self.anchor_label,
                command_prefix: self.command_prefix,
            },
            router: RouterConfig {
                relay_event: self.relay_event,
                announce_graph: self.announce_graph,
            },
            logseq: self.logseq,
        })
    }
}
