//! Core abstractions for the journal bridge agent.
//!
//! This crate provides the fundamental building blocks:
//! - `Page`, `Block`, `JournalDay` - The document model
//! - `Frame`, `RelayMessage` - Relay envelopes
//! - `DocumentStore`, `Notifier`, `Clock` - Host capabilities

pub mod clock;
pub mod document;
pub mod frame;
pub mod traits;

pub use clock::{Clock, FixedClock, SystemClock};
pub use document::{Block, BlockId, GraphInfo, InsertPosition, JournalDay, Page, PageId};
pub use frame::{Frame, FrameError, RelayMessage};
pub use traits::{DocumentStore, LogNotifier, Notice, NoticeLevel, Notifier, StoreError};
