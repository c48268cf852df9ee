//! Bridge agent that records relayed messages in today's journal page.
//!
//! Provides:
//! - `Settings` - Configuration loading and validation
//! - `EventRouter` - Dispatch transport events to the reconciler

pub mod config;
pub mod router;

pub use config::{AgentConfig, ConfigError, Overrides, Settings};
pub use router::{EventRouter, RouterConfig};
