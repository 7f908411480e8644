// Storage interface for the state stream
//
// Cursors talk to storage only through these traits. A backend keeps an
// ordered-by-timestamp log of entries and supports typed lookups around a
// timestamp. The reference implementation lives in [`memory`].

pub mod memory;

use crossbeam_channel::Sender;

use crate::entry::{EntryFilter, StreamEntry};
use crate::error::Result;
use crate::types::Timestamp;

/// Generic interface to stream storage
///
/// Implementations must return entries in ascending timestamp order and
/// honor the kind filter and timestamp bounds of each lookup; cursors treat
/// violations as fatal for the current computation.
pub trait StorageBackend: Send + Sync {
    /// The latest snapshot at or before `timestamp`, if any
    fn get_snapshot_before(&self, timestamp: Timestamp) -> Result<Option<StreamEntry>>;

    /// The earliest entry strictly after `timestamp` whose kind matches
    /// `filter`, if any
    fn get_entry_after(
        &self,
        timestamp: Timestamp,
        filter: EntryFilter,
    ) -> Result<Option<StreamEntry>>;

    /// Store an entry, maintaining timestamp order
    fn save_entry(&self, entry: StreamEntry) -> Result<()>;

    /// Replace the entry stored at `old_timestamp`
    fn amend_entry(&self, entry: StreamEntry, old_timestamp: Timestamp) -> Result<()>;

    /// Visit every entry in ascending timestamp order, stopping at the
    /// first callback error
    fn for_each_entry(&self, cb: &mut dyn FnMut(&StreamEntry) -> Result<()>) -> Result<()>;
}

/// Storage backends that can announce newly saved entries
pub trait StreamingBackend {
    /// Register a fan-out target for saved entries
    ///
    /// Delivery is send-if-space: a full channel is skipped rather than
    /// blocking the writer.
    fn entry_added(&self, sender: Sender<StreamEntry>);
}
