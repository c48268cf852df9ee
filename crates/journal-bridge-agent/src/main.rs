//! journal-bridge: records relayed chat messages in today's Logseq journal.
//!
//! Run with: cargo run -p journal-bridge-agent -- --agent-token <token>

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use journal_bridge_agent::{EventRouter, Overrides, Settings};
use journal_bridge_core::{Notice, Notifier, SystemClock};
use journal_bridge_journal::{Reconciler, storage::LogseqHttpStore};
use journal_bridge_transport::WebSocketSession;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "journal-bridge", version, about)]
struct Cli {
    /// Config file (defaults to `<config dir>/journal-bridge/config.toml`)
    #[arg(long, env = "JOURNAL_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Relay server URL
    #[arg(long, env = "JOURNAL_BRIDGE_SERVER_URL")]
    server_url: Option<String>,

    /// Token identifying this agent to the relay
    #[arg(long, env = "JOURNAL_BRIDGE_AGENT_TOKEN", hide_env_values = true)]
    agent_token: Option<String>,

    /// Socket event carrying messages to record
    #[arg(long, env = "JOURNAL_BRIDGE_RELAY_EVENT")]
    relay_event: Option<String>,

    /// Logseq HTTP API address
    #[arg(long, env = "JOURNAL_BRIDGE_LOGSEQ_API_URL")]
    logseq_api_url: Option<String>,

    /// Logseq HTTP API token
    #[arg(long, env = "JOURNAL_BRIDGE_LOGSEQ_API_TOKEN", hide_env_values = true)]
    logseq_api_token: Option<String>,

    /// Announce the current graph after connecting
    #[arg(long, env = "JOURNAL_BRIDGE_ANNOUNCE_GRAPH")]
    announce_graph: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            server_url: self.server_url.clone(),
            agent_token: self.agent_token.clone(),
            relay_event: self.relay_event.clone(),
            logseq_api_url: self.logseq_api_url.clone(),
            logseq_api_token: self.logseq_api_token.clone(),
            announce_graph: self.announce_graph,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    // The store is the notice channel, so it is built even when the file is bad.
    let (settings, load_error) = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };
    let settings = settings.with_overrides(cli.overrides());

    let store = Arc::new(
        LogseqHttpStore::new(&settings.logseq.api_url, settings.logseq.api_token.clone())
            .context("Failed to create Logseq API client")?,
    );

    let validated = match load_error {
        Some(e) => Err(e),
        None => settings.validate(),
    };
    let config = match validated {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            store.notify(Notice::error(e.user_message())).await;
            return Err(e.into());
        }
    };

    let (session, handle, events) = WebSocketSession::new(config.session)?;
    let session_task = session.spawn();

    let reconciler = Reconciler::new(
        Arc::clone(&store),
        store,
        Arc::new(SystemClock),
        config.reconciler,
    );
    let router = EventRouter::new(reconciler, handle, config.router);

    tokio::select! {
        () = router.run(events) => {
            tracing::warn!("Transport session ended");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutting down");
        }
    }

    session_task.abort();
    Ok(())
}
