//! Locates today's journal page and the anchor block on it.

use std::sync::Arc;

use journal_bridge_core::{
    Block, Clock, DocumentStore, InsertPosition, JournalDay, Page, PageId, StoreError,
};

/// Locator error.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("No journal page for {0}")]
    JournalPageMissing(JournalDay),
    #[error("Page {0} has no blocks")]
    EmptyPage(PageId),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Finds journal pages and anchor blocks in a document store.
///
/// Holds no document state: every call re-reads the store.
pub struct JournalLocator<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStore> JournalLocator<S> {
    /// Create a locator over `store`, reading dates from `clock`.
    #[must_use]
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Date key for the clock's current local date.
    #[must_use]
    pub fn today(&self) -> JournalDay {
        JournalDay::from_date(self.clock.now().date())
    }

    /// Find the journal page for today.
    ///
    /// Journal pages are never created here; the host creates them.
    ///
    /// # Errors
    /// Returns error if no page exists for today or the query fails.
    pub async fn resolve_today_page(&self) -> Result<Page, LocateError> {
        self.resolve_page_for(self.today()).await
    }

    /// Find the journal page for `day`.
    ///
    /// # Errors
    /// Returns error if no page exists for `day` or the query fails.
    pub async fn resolve_page_for(&self, day: JournalDay) -> Result<Page, LocateError> {
        tracing::debug!(%day, "Looking up journal page");
        self.store
            .journal_page(day)
            .await?
            .ok_or(LocateError::JournalPageMissing(day))
    }

    /// Find the top-level block labelled `label`, creating it if needed.
    ///
    /// A new anchor becomes a sibling of the first top-level block: after it
    /// when it has content, before it when it is an empty placeholder.
    ///
    /// # Errors
    /// Returns error if the page has no blocks or a store call fails.
    pub async fn resolve_or_create_anchor(
        &self,
        page: PageId,
        label: &str,
    ) -> Result<Block, LocateError> {
        let blocks = self.store.page_blocks(page).await?;

        if let Some(anchor) = blocks.iter().find(|b| b.is_anchor(label)) {
            tracing::debug!(%page, anchor = %anchor.uuid, "Found anchor block");
            return Ok(anchor.clone());
        }

        let first = blocks.first().ok_or(LocateError::EmptyPage(page))?;
        let position = anchor_position(first);
        let anchor = self.store.insert_block(first.uuid, label, position).await?;
        tracing::info!(%page, anchor = %anchor.uuid, before = position.before, "Created anchor block");
        Ok(anchor)
    }
}

/// Placement of a new anchor relative to the page's first block.
#[must_use]
pub fn anchor_position(first: &Block) -> InsertPosition {
    InsertPosition::sibling(first.content.is_empty())
}
