//! Logseq HTTP API store (feature-gated).
//!
//! Talks to the local API server Logseq exposes when "HTTP APIs server" is
//! enabled. Every call is a `POST /api` with `{"method", "args"}`.

use std::time::Duration;

use async_trait::async_trait;
use journal_bridge_core::{
    Block, BlockId, DocumentStore, GraphInfo, InsertPosition, JournalDay, Notice, Notifier,
    Page, PageId, StoreError,
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use uuid::Uuid;

/// Default Logseq API server address.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:12315";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Store backed by the Logseq HTTP API.
#[derive(Clone)]
pub struct LogseqHttpStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl LogseqHttpStore {
    /// Create a store for the API server at `base_url`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api", base_url.trim_end_matches('/')),
            token,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T, StoreError> {
        tracing::trace!(method, "Calling Logseq API");

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "method": method, "args": args }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{method}: {e}")))
    }
}

/// Page entity as returned by `datascriptQuery`.
///
/// Pages carry both a lowercased `name` and the display `originalName`; only
/// the display name is kept.
#[derive(Debug, Deserialize)]
struct WirePage {
    uuid: Uuid,
    #[serde(default, rename = "originalName")]
    name: String,
    #[serde(default, rename = "journal?")]
    journal: bool,
    #[serde(default, rename = "journalDay")]
    journal_day: Option<i64>,
}

impl From<WirePage> for Page {
    fn from(page: WirePage) -> Self {
        Self {
            uuid: page.uuid,
            name: page.name,
            journal: page.journal,
            journal_day: page.journal_day.map(JournalDay::new),
        }
    }
}

/// Block entity as returned by the editor API.
///
/// Children may be full entities or bare `["uuid", ...]` references for
/// collapsed subtrees; references are dropped.
#[derive(Debug, Deserialize)]
struct WireBlock {
    uuid: Uuid,
    #[serde(default)]
    content: String,
    #[serde(default)]
    children: Vec<Value>,
}

impl From<WireBlock> for Block {
    fn from(block: WireBlock) -> Self {
        Self {
            uuid: block.uuid,
            content: block.content,
            children: block
                .children
                .into_iter()
                .filter_map(|child| serde_json::from_value::<WireBlock>(child).ok())
                .map(Self::from)
                .collect(),
        }
    }
}

fn journal_query(day: JournalDay) -> String {
    format!(
        "[:find (pull ?p [*]) \
          :where \
          [?b :block/page ?p] \
          [?p :block/journal? true] \
          [?p :block/journal-day ?d] \
          [(= ?d {day})]]"
    )
}

#[async_trait]
impl DocumentStore for LogseqHttpStore {
    async fn journal_page(&self, day: JournalDay) -> Result<Option<Page>, StoreError> {
        let rows: Option<Vec<Vec<WirePage>>> = self
            .call("logseq.DB.datascriptQuery", json!([journal_query(day)]))
            .await?;

        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .find_map(|row| row.into_iter().next())
            .map(Page::from))
    }

    async fn page_blocks(&self, page: PageId) -> Result<Vec<Block>, StoreError> {
        let tree: Option<Vec<WireBlock>> = self
            .call("logseq.Editor.getPageBlocksTree", json!([page.to_string()]))
            .await?;

        Ok(tree
            .unwrap_or_default()
            .into_iter()
            .map(Block::from)
            .collect())
    }

    async fn insert_block(
        &self,
        target: BlockId,
        content: &str,
        position: InsertPosition,
    ) -> Result<Block, StoreError> {
        let block: Option<WireBlock> = self
            .call(
                "logseq.Editor.insertBlock",
                json!([
                    target.to_string(),
                    content,
                    { "before": position.before, "sibling": position.sibling }
                ]),
            )
            .await?;

        block
            .map(Block::from)
            .ok_or(StoreError::BlockNotFound(target))
    }

    async fn current_graph(&self) -> Result<Option<GraphInfo>, StoreError> {
        self.call("logseq.App.getCurrentGraph", json!([])).await
    }
}

#[async_trait]
impl Notifier for LogseqHttpStore {
    async fn notify(&self, notice: Notice) {
        let result: Result<Option<Value>, StoreError> = self
            .call(
                "logseq.UI.showMsg",
                json!([notice.message, notice.level.as_str()]),
            )
            .await;

        if let Err(e) = result {
            tracing::warn!(message = %notice.message, "Failed to show notice: {e}");
        }
    }
}
