//! Document store implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "memory")]
pub use memory::{Insertion, MemoryStore, RecordingNotifier};

#[cfg(feature = "http")]
pub use http::LogseqHttpStore;
