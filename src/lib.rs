// Time-indexed state stream
//
// This crate maintains a time-indexed stream of changes to a single
// JSON-like document, persisted as a mix of full snapshots (keyframes) and
// deltas (mutations) against the preceding state, the way a video codec
// mixes keyframes and interframes. Cursors replay the log to materialize
// the document at any timestamp and move that state forward or backward
// along the timeline.

// Core value types
pub mod config;
pub mod delta;
pub mod entry;
pub mod error;
pub mod state;
pub mod types;

// Storage
pub mod storage;

// The replay state machine and its facade
pub mod cursor;
pub mod stream;

#[cfg(test)]
mod tests;

// Re-export main types
pub use config::{RecordRate, StreamConfig};
pub use cursor::{Cursor, CursorMode, EntrySubscription};
pub use delta::Delta;
pub use entry::{EntryData, EntryFilter, EntryKind, StreamEntry};
pub use error::{Error, Result};
pub use state::StateData;
pub use storage::memory::MemoryBackend;
pub use storage::{StorageBackend, StreamingBackend};
pub use stream::Stream;
pub use types::Timestamp;
