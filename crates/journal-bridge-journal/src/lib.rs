//! Journal page location and message reconciliation.
//!
//! Provides:
//! - `JournalLocator` - Find today's journal page and its anchor block
//! - `Reconciler` - Record relayed messages under the anchor
//! - Store implementations (memory, Logseq HTTP API)

pub mod locator;
pub mod reconciler;
pub mod storage;

pub use locator::{JournalLocator, LocateError};
pub use reconciler::{ReconcileError, Reconciler, ReconcilerConfig, Reconciliation};
