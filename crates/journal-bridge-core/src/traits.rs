//! Capability traits for the host document store and notification surface.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{Block, BlockId, GraphInfo, InsertPosition, JournalDay, Page, PageId};

/// Store error.
///
/// Always distinct from an empty result: lookups that find nothing return
/// `Ok(None)` or an empty list.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),
    #[error("Page not found: {0}")]
    PageNotFound(PageId),
    #[error("Store error: {0}")]
    Internal(String),
}

/// Trait for document store backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find the journal page for a date key.
    async fn journal_page(&self, day: JournalDay) -> Result<Option<Page>, StoreError>;

    /// Top-level blocks of a page in document order, children nested.
    async fn page_blocks(&self, page: PageId) -> Result<Vec<Block>, StoreError>;

    /// Insert a block relative to `target`.
    async fn insert_block(
        &self,
        target: BlockId,
        content: &str,
        position: InsertPosition,
    ) -> Result<Block, StoreError>;

    /// Describe the currently open graph.
    async fn current_graph(&self) -> Result<Option<GraphInfo>, StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn journal_page(&self, day: JournalDay) -> Result<Option<Page>, StoreError> {
        (**self).journal_page(day).await
    }

    async fn page_blocks(&self, page: PageId) -> Result<Vec<Block>, StoreError> {
        (**self).page_blocks(page).await
    }

    async fn insert_block(
        &self,
        target: BlockId,
        content: &str,
        position: InsertPosition,
    ) -> Result<Block, StoreError> {
        (**self).insert_block(target, content, position).await
    }

    async fn current_graph(&self) -> Result<Option<GraphInfo>, StoreError> {
        (**self).current_graph().await
    }
}

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    /// Name used by host toast APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A transient message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Trait for user-visible notification surfaces.
///
/// Delivery is best effort. Implementations log their own failures
/// instead of returning them.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a notice to the user.
    async fn notify(&self, notice: Notice);
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify(&self, notice: Notice) {
        (**self).notify(notice).await;
    }
}

/// Notifier that only writes notices to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!(message = %notice.message, "notice"),
            NoticeLevel::Warning => tracing::warn!(message = %notice.message, "notice"),
            NoticeLevel::Info | NoticeLevel::Success => {
                tracing::info!(message = %notice.message, "notice");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Notice>>);

    #[async_trait]
    impl Notifier for Collect {
        async fn notify(&self, notice: Notice) {
            self.0.lock().unwrap().push(notice);
        }
    }

    #[test]
    fn test_notice_levels() {
        assert_eq!(Notice::info("hi").level.as_str(), "info");
        assert_eq!(Notice::error("oops").level.as_str(), "error");
        assert_eq!(
            serde_json::to_value(NoticeLevel::Warning).unwrap(),
            serde_json::json!("warning")
        );
    }

    #[tokio::test]
    async fn test_arc_notifier_forwards() {
        let inner = Arc::new(Collect::default());
        let notifier: Arc<dyn Notifier> = inner.clone();
        notifier.notify(Notice::error("Cannot record message.")).await;

        let notices = inner.0.lock().unwrap();
        assert_eq!(notices.as_slice(), [Notice::error("Cannot record message.")]);
    }

    #[test]
    fn test_log_notifier_never_fails() {
        tokio_test::block_on(async {
            LogNotifier.notify(Notice::info("Connected")).await;
            LogNotifier.notify(Notice::error("Cannot find target block.")).await;
        });
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error (401): unauthorized");
    }
}
