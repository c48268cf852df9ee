//! Records relayed messages in today's journal page.

use std::sync::Arc;

use chrono::NaiveTime;
use journal_bridge_core::{
    Block, BlockId, Clock, DocumentStore, InsertPosition, JournalDay, Notice, Notifier, PageId,
    RelayMessage, StoreError,
};

use crate::locator::{JournalLocator, LocateError};

/// Default anchor block label.
pub const DEFAULT_ANCHOR_LABEL: &str = "[[Log]]";

/// Default prefix marking control commands.
pub const DEFAULT_COMMAND_PREFIX: char = '/';

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Content of the block messages are nested under.
    pub anchor_label: String,
    /// Messages starting with this character are never recorded.
    pub command_prefix: char,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            anchor_label: DEFAULT_ANCHOR_LABEL.to_string(),
            command_prefix: DEFAULT_COMMAND_PREFIX,
        }
    }
}

/// Reconciliation error.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Journal page lookup failed: {0}")]
    JournalPage(#[source] LocateError),
    #[error("Anchor block lookup failed: {0}")]
    Anchor(#[source] LocateError),
    #[error("Block insert failed: {0}")]
    Insert(#[source] StoreError),
}

impl ReconcileError {
    /// Short message for the user-visible notice.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::JournalPage(_) => "Cannot find today's journal page.",
            Self::Anchor(_) => "Cannot find target block.",
            Self::Insert(_) => "Cannot record message.",
        }
    }
}

/// Outcome of handling one message event.
#[derive(Debug)]
pub enum Reconciliation {
    /// The message was a control command and was not recorded.
    Discarded,
    /// The message was recorded under the anchor.
    Recorded {
        page: PageId,
        anchor: BlockId,
        block: Block,
    },
    /// A lookup or insert failed; the message was not recorded.
    Failed(ReconcileError),
}

impl Reconciliation {
    /// Whether the message ended up in the document.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

/// Turns relayed messages into blocks under today's anchor.
///
/// Each message re-resolves its page and anchor from scratch.
pub struct Reconciler<S, N> {
    locator: JournalLocator<S>,
    notifier: N,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
}

impl<S, N> Reconciler<S, N>
where
    S: DocumentStore,
    N: Notifier,
{
    /// Create a new reconciler.
    #[must_use]
    pub fn new(store: S, notifier: N, clock: Arc<dyn Clock>, config: ReconcilerConfig) -> Self {
        Self {
            locator: JournalLocator::new(store, Arc::clone(&clock)),
            notifier,
            clock,
            config,
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        self.locator.store()
    }

    /// The notifier failures are reported to.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Whether `text` is a control command rather than loggable content.
    #[must_use]
    pub fn is_command(&self, text: &str) -> bool {
        text.starts_with(self.config.command_prefix)
    }

    /// Handle one relayed message.
    ///
    /// Failures are logged and shown to the user, never returned as errors.
    pub async fn handle_message_event(&self, message: &RelayMessage) -> Reconciliation {
        match self.reconcile(message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(sender = ?message.sender, "Failed to record message: {e}");
                self.notifier.notify(Notice::error(e.user_message())).await;
                Reconciliation::Failed(e)
            }
        }
    }

    /// Record one relayed message without reporting failures.
    ///
    /// # Errors
    /// Returns error if the page or anchor cannot be resolved or the insert fails.
    pub async fn reconcile(&self, message: &RelayMessage) -> Result<Reconciliation, ReconcileError> {
        if self.is_command(&message.text) {
            tracing::trace!(text = %message.text, "Ignoring command");
            return Ok(Reconciliation::Discarded);
        }

        let now = self.clock.now();
        let content = format_entry(now.time(), &message.text);

        let page = self
            .locator
            .resolve_page_for(JournalDay::from_date(now.date()))
            .await
            .map_err(ReconcileError::JournalPage)?;

        let anchor = self
            .locator
            .resolve_or_create_anchor(page.uuid, &self.config.anchor_label)
            .await
            .map_err(ReconcileError::Anchor)?;

        let block = self
            .store()
            .insert_block(anchor.uuid, &content, InsertPosition::last_child())
            .await
            .map_err(ReconcileError::Insert)?;

        tracing::info!(page = %page.uuid, block = %block.uuid, "Recorded message");

        Ok(Reconciliation::Recorded {
            page: page.uuid,
            anchor: anchor.uuid,
            block,
        })
    }
}

/// Prefix `text` with a zero-padded 24-hour `HH:MM` timestamp.
#[must_use]
pub fn format_entry(at: NaiveTime, text: &str) -> String {
    format!("{} - {text}", at.format("%H:%M"))
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use std::sync::Mutex;

    use chrono::{NaiveDate, NaiveDateTime};
    use journal_bridge_core::{FixedClock, NoticeLevel};

    use super::*;
    use crate::storage::{MemoryStore, RecordingNotifier};

    type TestReconciler = Reconciler<Arc<MemoryStore>, Arc<RecordingNotifier>>;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    fn reconciler_at(
        store: &Arc<MemoryStore>,
        notifier: &Arc<RecordingNotifier>,
        hour: u32,
        minute: u32,
    ) -> TestReconciler {
        let at = date().and_hms_opt(hour, minute, 0).unwrap();
        Reconciler::new(
            Arc::clone(store),
            Arc::clone(notifier),
            Arc::new(FixedClock::new(at)),
            ReconcilerConfig::default(),
        )
    }

    /// Clock that moves to the next instant on every read.
    struct TickingClock(Mutex<Vec<NaiveDateTime>>);

    impl Clock for TickingClock {
        fn now(&self) -> NaiveDateTime {
            let mut ticks = self.0.lock().unwrap();
            if ticks.len() > 1 { ticks.remove(0) } else { ticks[0] }
        }
    }

    #[test]
    fn test_format_entry() {
        let at = NaiveTime::from_hms_opt(9, 5, 0).unwrap();
        assert_eq!(format_entry(at, "hello"), "09:05 - hello");

        let at = NaiveTime::from_hms_opt(23, 59, 59).unwrap();
        assert_eq!(format_entry(at, "late"), "23:59 - late");
    }

    #[tokio::test]
    async fn test_command_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let page = store.add_journal_page(date()).unwrap();
        store.push_block(page, "").unwrap();

        let outcome = reconciler_at(&store, &notifier, 9, 5)
            .handle_message_event(&RelayMessage::new("/skip this"))
            .await;

        assert!(matches!(outcome, Reconciliation::Discarded));
        assert!(store.insertions().unwrap().is_empty());
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_command_discarded_without_journal_page() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome = reconciler_at(&store, &notifier, 9, 5)
            .handle_message_event(&RelayMessage::new("/start"))
            .await;

        assert!(matches!(outcome, Reconciliation::Discarded));
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_message_recorded_with_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let page = store.add_journal_page(date()).unwrap();
        store.push_block(page, "notes").unwrap();

        let outcome = reconciler_at(&store, &notifier, 9, 5)
            .handle_message_event(&RelayMessage::new("hello"))
            .await;

        let Reconciliation::Recorded { block, .. } = outcome else {
            panic!("message was not recorded");
        };
        assert_eq!(block.content, "09:05 - hello");
    }

    #[tokio::test]
    async fn test_end_to_end_on_empty_page() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let page = store.add_journal_page(date()).unwrap();
        let placeholder = store.push_block(page, "").unwrap();

        let outcome = reconciler_at(&store, &notifier, 14, 32)
            .handle_message_event(&RelayMessage::new("bought milk"))
            .await;
        assert!(outcome.is_recorded());

        let insertions = store.insertions().unwrap();
        assert_eq!(insertions.len(), 2);
        assert_eq!(insertions[0].target, placeholder);
        assert_eq!(insertions[0].content, "[[Log]]");
        assert_eq!(insertions[0].position, InsertPosition::sibling(true));
        assert_eq!(insertions[1].target, insertions[0].created);
        assert_eq!(insertions[1].position, InsertPosition::last_child());

        let blocks = store.blocks(page).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, "[[Log]]");
        assert_eq!(blocks[0].children.len(), 1);
        assert_eq!(blocks[0].children[0].content, "14:32 - bought milk");
        assert_eq!(blocks[1].content, "");
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_messages_accumulate_in_order() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let page = store.add_journal_page(date()).unwrap();
        store.push_block(page, "notes").unwrap();

        for (hour, text) in [(8, "coffee"), (12, "lunch"), (18, "gym")] {
            let outcome = reconciler_at(&store, &notifier, hour, 0)
                .handle_message_event(&RelayMessage::new(text))
                .await;
            assert!(outcome.is_recorded());
        }

        let blocks = store.blocks(page).unwrap();
        let anchors: Vec<_> = blocks.iter().filter(|b| b.is_anchor("[[Log]]")).collect();
        assert_eq!(anchors.len(), 1);

        let children: Vec<_> = anchors[0]
            .children
            .iter()
            .map(|b| b.content.as_str())
            .collect();
        assert_eq!(children, ["08:00 - coffee", "12:00 - lunch", "18:00 - gym"]);
    }

    #[tokio::test]
    async fn test_missing_journal_page_aborts() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome = reconciler_at(&store, &notifier, 9, 5)
            .handle_message_event(&RelayMessage::new("hello"))
            .await;

        assert!(matches!(
            outcome,
            Reconciliation::Failed(ReconcileError::JournalPage(
                LocateError::JournalPageMissing(_)
            ))
        ));
        assert!(store.insertions().unwrap().is_empty());

        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].message, "Cannot find today's journal page.");
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_as_lookup_failure() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        store.add_journal_page(date()).unwrap();
        store.fail_queries(true);

        let outcome = reconciler_at(&store, &notifier, 9, 5)
            .handle_message_event(&RelayMessage::new("hello"))
            .await;

        assert!(matches!(
            outcome,
            Reconciliation::Failed(ReconcileError::JournalPage(LocateError::Store(_)))
        ));
        assert_eq!(notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_aborts_with_notice() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        store.add_journal_page(date()).unwrap();

        let outcome = reconciler_at(&store, &notifier, 9, 5)
            .handle_message_event(&RelayMessage::new("hello"))
            .await;

        assert!(matches!(
            outcome,
            Reconciliation::Failed(ReconcileError::Anchor(LocateError::EmptyPage(_)))
        ));
        assert_eq!(notifier.notices()[0].message, "Cannot find target block.");
        assert!(store.insertions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_anchor_and_prefix() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let page = store.add_journal_page(date()).unwrap();
        store.push_block(page, "notes").unwrap();

        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::new(FixedClock::new(date().and_hms_opt(7, 30, 0).unwrap())),
            ReconcilerConfig {
                anchor_label: "[[Inbox]]".to_string(),
                command_prefix: '!',
            },
        );

        assert!(matches!(
            reconciler
                .handle_message_event(&RelayMessage::new("!ping"))
                .await,
            Reconciliation::Discarded
        ));
        assert!(
            reconciler
                .handle_message_event(&RelayMessage::new("/not a command here"))
                .await
                .is_recorded()
        );

        let blocks = store.blocks(page).unwrap();
        assert_eq!(blocks[1].content, "[[Inbox]]");
        assert_eq!(blocks[1].children[0].content, "07:30 - /not a command here");
    }

    #[tokio::test]
    async fn test_insert_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let page = store.add_journal_page(date()).unwrap();
        store.push_block(page, "notes").unwrap();
        store.push_block(page, "[[Log]]").unwrap();
        store.fail_inserts(true);

        let outcome = reconciler_at(&store, &notifier, 9, 5)
            .handle_message_event(&RelayMessage::new("hello"))
            .await;

        assert!(matches!(
            outcome,
            Reconciliation::Failed(ReconcileError::Insert(_))
        ));
        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].message, "Cannot record message.");
        assert!(store.insertions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_at_midnight_stays_on_its_day() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let page = store.add_journal_page(date()).unwrap();
        store.push_block(page, "notes").unwrap();

        let next_day = date().succ_opt().unwrap();
        let clock = TickingClock(Mutex::new(vec![
            date().and_hms_opt(23, 59, 59).unwrap(),
            next_day.and_hms_opt(0, 0, 0).unwrap(),
        ]));
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::new(clock),
            ReconcilerConfig::default(),
        );

        let outcome = reconciler
            .handle_message_event(&RelayMessage::new("good night"))
            .await;

        let Reconciliation::Recorded { page: recorded, block, .. } = outcome else {
            panic!("message was not recorded");
        };
        assert_eq!(recorded, page);
        assert_eq!(block.content, "23:59 - good night");
        assert!(notifier.notices().is_empty());
    }
}
