//! Document model: pages, blocks and journal day keys.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Page identifier.
pub type PageId = Uuid;

/// Block identifier.
pub type BlockId = Uuid;

/// Integer date key of a journal page, e.g. `20240307`.
///
/// Equal to concatenating the year with the zero-padded month and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalDay(i64);

impl JournalDay {
    /// Wrap a raw `YYYYMMDD` key.
    #[must_use]
    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    /// Key for a calendar date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self(i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day()))
    }

    /// The raw integer key.
    #[must_use]
    pub const fn key(self) -> i64 {
        self.0
    }
}

impl fmt::Display for JournalDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Unique page identifier.
    pub uuid: PageId,
    /// Page name as shown in the graph.
    #[serde(default)]
    pub name: String,
    /// Whether the page is bound to a calendar date.
    #[serde(default)]
    pub journal: bool,
    /// Date key for journal pages.
    #[serde(default)]
    pub journal_day: Option<JournalDay>,
}

/// A block of content on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Unique block identifier.
    pub uuid: BlockId,
    /// Raw text content.
    #[serde(default)]
    pub content: String,
    /// Nested child blocks in document order.
    #[serde(default)]
    pub children: Vec<Block>,
}

impl Block {
    /// Whether this block is the anchor labelled `label`.
    ///
    /// Matching is exact: case-sensitive and untrimmed.
    #[must_use]
    pub fn is_anchor(&self, label: &str) -> bool {
        self.content == label
    }
}

/// Where a new block goes relative to its target block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertPosition {
    /// Insert before the target instead of after it.
    pub before: bool,
    /// Insert as a sibling of the target instead of as its child.
    pub sibling: bool,
}

impl InsertPosition {
    /// Sibling of the target, before or after it.
    #[must_use]
    pub const fn sibling(before: bool) -> Self {
        Self {
            before,
            sibling: true,
        }
    }

    /// Last nested child of the target.
    #[must_use]
    pub const fn last_child() -> Self {
        Self {
            before: false,
            sibling: false,
        }
    }
}

/// Descriptor of the host's currently open graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInfo {
    /// Graph name.
    pub name: String,
    /// Location of the graph on disk.
    #[serde(default)]
    pub path: Option<String>,
    /// Host-specific graph URL.
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> JournalDay {
        JournalDay::from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_journal_day_pads_single_digits() {
        assert_eq!(day(2024, 3, 7).key(), 20_240_307);
        assert_eq!(day(2024, 3, 7).to_string(), "20240307");
    }

    #[test]
    fn test_journal_day_double_digits() {
        assert_eq!(day(2023, 12, 25).key(), 20_231_225);
        assert_eq!(day(2025, 10, 1).key(), 20_251_001);
    }

    #[test]
    fn test_journal_day_orders_chronologically() {
        assert!(day(2024, 1, 31) < day(2024, 2, 1));
        assert!(day(2023, 12, 31) < day(2024, 1, 1));
    }

    #[test]
    fn test_anchor_match_is_exact() {
        let block = Block {
            uuid: Uuid::new_v4(),
            content: "[[Log]]".to_string(),
            children: Vec::new(),
        };
        assert!(block.is_anchor("[[Log]]"));
        assert!(!block.is_anchor("[[log]]"));
        assert!(!block.is_anchor(" [[Log]]"));
    }

    #[test]
    fn test_insert_positions() {
        assert_eq!(
            InsertPosition::last_child(),
            InsertPosition {
                before: false,
                sibling: false
            }
        );
        assert!(InsertPosition::sibling(true).before);
        assert!(InsertPosition::sibling(false).sibling);
    }
}
