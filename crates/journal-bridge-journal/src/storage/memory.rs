//! In-memory document store.

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::NaiveDate;
use journal_bridge_core::{
    Block, BlockId, DocumentStore, GraphInfo, InsertPosition, JournalDay, Notice, Notifier,
    Page, PageId, StoreError,
};
use uuid::Uuid;

/// A recorded `insert_block` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub target: BlockId,
    pub content: String,
    pub position: InsertPosition,
    pub created: BlockId,
}

struct Inner {
    pages: Vec<Page>,
    blocks: HashMap<PageId, Vec<Block>>,
    graph: Option<GraphInfo>,
    insertions: Vec<Insertion>,
}

/// In-memory store implementation.
///
/// Useful for development and tests.
/// Data is lost on restart.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_queries: AtomicBool,
    fail_inserts: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                pages: Vec::new(),
                blocks: HashMap::new(),
                graph: None,
                insertions: Vec::new(),
            }),
            fail_queries: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
        }
    }

    /// Add a page with no blocks.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn add_page(&self, page: Page) -> Result<PageId, StoreError> {
        let id = page.uuid;
        let mut inner = self.write()?;
        inner.pages.push(page);
        inner.blocks.insert(id, Vec::new());
        Ok(id)
    }

    /// Add the journal page for `date`.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn add_journal_page(&self, date: NaiveDate) -> Result<PageId, StoreError> {
        self.add_page(Page {
            uuid: Uuid::new_v4(),
            name: date.format("%b %-d, %Y").to_string().to_lowercase(),
            journal: true,
            journal_day: Some(JournalDay::from_date(date)),
        })
    }

    /// Append a top-level block to a page.
    ///
    /// # Errors
    /// Returns error if the page does not exist.
    pub fn push_block(&self, page: PageId, content: &str) -> Result<BlockId, StoreError> {
        let block = new_block(content);
        let id = block.uuid;
        self.write()?
            .blocks
            .get_mut(&page)
            .ok_or(StoreError::PageNotFound(page))?
            .push(block);
        Ok(id)
    }

    /// Snapshot of a page's block tree.
    ///
    /// # Errors
    /// Returns error if the page does not exist.
    pub fn blocks(&self, page: PageId) -> Result<Vec<Block>, StoreError> {
        self.read()?
            .blocks
            .get(&page)
            .cloned()
            .ok_or(StoreError::PageNotFound(page))
    }

    /// Set the graph returned by `current_graph`.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn set_graph(&self, graph: GraphInfo) -> Result<(), StoreError> {
        self.write()?.graph = Some(graph);
        Ok(())
    }

    /// Every insertion made so far, oldest first.
    ///
    /// # Errors
    /// Returns error if the store lock is poisoned.
    pub fn insertions(&self) -> Result<Vec<Insertion>, StoreError> {
        Ok(self.read()?.insertions.clone())
    }

    /// Make every subsequent query fail with an internal error.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent insert fail while reads keep working.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    fn check_failing(&self) -> Result<(), StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("query failed".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_block(content: &str) -> Block {
    Block {
        uuid: Uuid::new_v4(),
        content: content.to_string(),
        children: Vec::new(),
    }
}

/// Place `block` relative to `target` somewhere in `siblings`.
///
/// Hands the block back when the target is not in this subtree.
fn insert_relative(
    siblings: &mut Vec<Block>,
    target: BlockId,
    block: Block,
    position: InsertPosition,
) -> Option<Block> {
    if let Some(idx) = siblings.iter().position(|b| b.uuid == target) {
        match (position.sibling, position.before) {
            (true, true) => siblings.insert(idx, block),
            (true, false) => siblings.insert(idx + 1, block),
            (false, true) => siblings[idx].children.insert(0, block),
            (false, false) => siblings[idx].children.push(block),
        }
        return None;
    }

    let mut pending = block;
    for sibling in siblings.iter_mut() {
        match insert_relative(&mut sibling.children, target, pending, position) {
            None => return None,
            Some(block) => pending = block,
        }
    }
    Some(pending)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn journal_page(&self, day: JournalDay) -> Result<Option<Page>, StoreError> {
        self.check_failing()?;
        Ok(self
            .read()?
            .pages
            .iter()
            .find(|p| p.journal && p.journal_day == Some(day))
            .cloned())
    }

    async fn page_blocks(&self, page: PageId) -> Result<Vec<Block>, StoreError> {
        self.check_failing()?;
        Ok(self.read()?.blocks.get(&page).cloned().unwrap_or_default())
    }

    async fn insert_block(
        &self,
        target: BlockId,
        content: &str,
        position: InsertPosition,
    ) -> Result<Block, StoreError> {
        self.check_failing()?;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("insert failed".to_string()));
        }
        let block = new_block(content);
        let created = block.clone();

        let mut inner = self.write()?;
        let mut pending = Some(block);
        for tree in inner.blocks.values_mut() {
            if let Some(block) = pending.take() {
                pending = insert_relative(tree, target, block, position);
            }
        }
        if pending.is_some() {
            return Err(StoreError::BlockNotFound(target));
        }

        inner.insertions.push(Insertion {
            target,
            content: content.to_string(),
            position,
            created: created.uuid,
        });
        Ok(created)
    }

    async fn current_graph(&self) -> Result<Option<GraphInfo>, StoreError> {
        self.check_failing()?;
        Ok(self.read()?.graph.clone())
    }
}

/// Notifier that keeps every notice for later inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: RwLock<Vec<Notice>>,
}

impl RecordingNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices shown so far, oldest first.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .read()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: Notice) {
        match self.notices.write() {
            Ok(mut notices) => notices.push(notice),
            Err(e) => tracing::warn!("Failed to record notice: {e}"),
        }
    }
}
