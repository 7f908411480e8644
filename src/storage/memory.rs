// Memory storage implementation for the state stream
//
// This module provides a general purpose in-memory implementation of the
// StorageBackend trait, suitable for tests and for callers that persist
// elsewhere.

use std::sync::RwLock;

use crossbeam_channel::Sender;
use log::debug;

use crate::entry::{EntryFilter, EntryKind, StreamEntry};
use crate::error::{Error, Result};
use crate::storage::{StorageBackend, StreamingBackend};
use crate::types::Timestamp;

/// In-memory storage for stream entries
///
/// Entries are kept in a vector sorted ascending by timestamp; lookups use
/// binary search. A read-write lock protects the entries, a separate lock
/// protects the subscribers list.
pub struct MemoryBackend {
    entries: RwLock<Vec<StreamEntry>>,
    subscribers: RwLock<Vec<Sender<StreamEntry>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Create a backend seeded with entries
    ///
    /// The entries are sorted by timestamp on ingestion.
    pub fn with_entries(mut entries: Vec<StreamEntry>) -> Self {
        entries.sort_by_key(|entry| entry.timestamp);
        Self {
            entries: RwLock::new(entries),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_entries()?.len())
    }

    /// Whether the backend holds no entries
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_entries()?.is_empty())
    }

    /// A copy of the stored entries, ascending by timestamp
    pub fn entries(&self) -> Result<Vec<StreamEntry>> {
        Ok(self.read_entries()?.clone())
    }

    fn read_entries(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<StreamEntry>>> {
        self.entries
            .read()
            .map_err(|_| Error::Lock("failed to acquire read lock on entries".to_string()))
    }

    fn write_entries(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<StreamEntry>>> {
        self.entries
            .write()
            .map_err(|_| Error::Lock("failed to acquire write lock on entries".to_string()))
    }

    /// Index of the first entry with a timestamp at or after `timestamp`
    fn first_at_or_after(entries: &[StreamEntry], timestamp: Timestamp) -> usize {
        entries.partition_point(|entry| entry.timestamp < timestamp)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get_snapshot_before(&self, timestamp: Timestamp) -> Result<Option<StreamEntry>> {
        let entries = self.read_entries()?;
        // Everything at or before the requested time, latest first.
        let bound = entries.partition_point(|entry| entry.timestamp <= timestamp);
        Ok(entries[..bound]
            .iter()
            .rev()
            .find(|entry| entry.kind() == EntryKind::Snapshot)
            .cloned())
    }

    fn get_entry_after(
        &self,
        timestamp: Timestamp,
        filter: EntryFilter,
    ) -> Result<Option<StreamEntry>> {
        let entries = self.read_entries()?;
        let start = entries.partition_point(|entry| entry.timestamp <= timestamp);
        Ok(entries[start..]
            .iter()
            .find(|entry| filter.matches(entry.kind()))
            .cloned())
    }

    fn save_entry(&self, entry: StreamEntry) -> Result<()> {
        {
            let mut entries = self.write_entries()?;
            let idx = Self::first_at_or_after(&entries, entry.timestamp);
            entries.insert(idx, entry.clone());
        }

        let subscribers = self
            .subscribers
            .read()
            .map_err(|_| Error::Lock("failed to acquire read lock on subscribers".to_string()))?;
        for sender in subscribers.iter() {
            if sender.try_send(entry.clone()).is_err() {
                debug!("dropping saved entry for a full or closed subscriber channel");
            }
        }
        Ok(())
    }

    fn amend_entry(&self, entry: StreamEntry, old_timestamp: Timestamp) -> Result<()> {
        let mut entries = self.write_entries()?;
        let idx = Self::first_at_or_after(&entries, old_timestamp);
        if idx < entries.len() && entries[idx].timestamp == old_timestamp {
            entries[idx] = entry;
        } else {
            debug!("amend target at {} not found, ignoring", old_timestamp);
        }
        Ok(())
    }

    fn for_each_entry(&self, cb: &mut dyn FnMut(&StreamEntry) -> Result<()>) -> Result<()> {
        let entries = self.read_entries()?;
        for entry in entries.iter() {
            cb(entry)?;
        }
        Ok(())
    }
}

impl StreamingBackend for MemoryBackend {
    fn entry_added(&self, sender: Sender<StreamEntry>) {
        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.push(sender);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Delta;
    use crate::state::StateData;
    use crossbeam_channel::bounded;
    use serde_json::json;

    fn ts(offset_secs: i64) -> Timestamp {
        Timestamp::from_millis(1_700_000_000_000 + offset_secs * 1_000)
    }

    fn state(test_value: i64) -> StateData {
        let mut state = StateData::new();
        state.insert("test", json!(test_value));
        state
    }

    /// Snapshot at -10s and -5s, mutations everywhere else between -10s
    /// and -1s.
    fn seeded_backend() -> MemoryBackend {
        let mut entries = Vec::new();
        for i in 0..10 {
            let at = ts(-10 + i);
            let entry = if i == 0 || i == 5 {
                StreamEntry::snapshot(at, state(i + 1))
            } else {
                StreamEntry::mutation(at, Delta::build(&state(i), &state(i + 1)))
            };
            entries.push(entry);
        }
        MemoryBackend::with_entries(entries)
    }

    #[test]
    fn test_snapshot_before() -> Result<()> {
        let backend = seeded_backend();
        let snap = backend
            .get_snapshot_before(ts(-9))?
            .expect("snapshot expected");
        assert_eq!(snap.timestamp, ts(-10));
        assert_eq!(snap.as_snapshot().unwrap().get("test"), Some(&json!(1)));
        Ok(())
    }

    #[test]
    fn test_snapshot_before_is_inclusive() -> Result<()> {
        let backend = seeded_backend();
        let snap = backend
            .get_snapshot_before(ts(-5))?
            .expect("snapshot expected");
        assert_eq!(snap.timestamp, ts(-5));
        Ok(())
    }

    #[test]
    fn test_snapshot_before_none_when_too_early() -> Result<()> {
        let backend = seeded_backend();
        assert!(backend.get_snapshot_before(ts(-11))?.is_none());
        Ok(())
    }

    #[test]
    fn test_entry_after_with_filter() -> Result<()> {
        let backend = seeded_backend();
        let snap = backend
            .get_entry_after(ts(-9), EntryFilter::Snapshot)?
            .expect("snapshot expected");
        assert_eq!(snap.timestamp, ts(-5));
        assert_eq!(snap.as_snapshot().unwrap().get("test"), Some(&json!(6)));
        Ok(())
    }

    #[test]
    fn test_entry_after_is_strict() -> Result<()> {
        let backend = seeded_backend();
        let entry = backend
            .get_entry_after(ts(-10), EntryFilter::Any)?
            .expect("entry expected");
        assert_eq!(entry.timestamp, ts(-9));
        assert!(backend.get_entry_after(ts(-1), EntryFilter::Any)?.is_none());
        Ok(())
    }

    #[test]
    fn test_save_keeps_order_and_notifies() -> Result<()> {
        let backend = seeded_backend();
        let (tx, rx) = bounded(4);
        backend.entry_added(tx);

        backend.save_entry(StreamEntry::snapshot(ts(-7).add_millis(500), state(99)))?;

        let found = backend
            .get_entry_after(ts(-8), EntryFilter::Snapshot)?
            .expect("snapshot expected");
        assert_eq!(found.timestamp, ts(-7).add_millis(500));
        assert_eq!(rx.try_recv().unwrap().timestamp, ts(-7).add_millis(500));

        // Order stays ascending end to end.
        let mut last = Timestamp::EPOCH;
        backend.for_each_entry(&mut |entry| {
            assert!(entry.timestamp > last);
            last = entry.timestamp;
            Ok(())
        })?;
        Ok(())
    }

    #[test]
    fn test_full_subscriber_channel_is_skipped() -> Result<()> {
        let backend = MemoryBackend::new();
        let (tx, rx) = bounded(1);
        backend.entry_added(tx);

        backend.save_entry(StreamEntry::snapshot(ts(0), state(1)))?;
        backend.save_entry(StreamEntry::snapshot(ts(1), state(2)))?;

        // Only the first fit; the second was dropped without blocking.
        assert_eq!(rx.try_recv().unwrap().timestamp, ts(0));
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn test_amend_replaces_in_place() -> Result<()> {
        let backend = seeded_backend();
        let count = backend.len()?;
        backend.amend_entry(StreamEntry::snapshot(ts(-8), state(42)), ts(-8))?;
        assert_eq!(backend.len()?, count);

        let amended = backend
            .get_entry_after(ts(-9), EntryFilter::Snapshot)?
            .expect("snapshot expected");
        assert_eq!(amended.timestamp, ts(-8));
        assert_eq!(amended.as_snapshot().unwrap().get("test"), Some(&json!(42)));
        Ok(())
    }

    #[test]
    fn test_amend_missing_timestamp_is_a_no_op() -> Result<()> {
        let backend = seeded_backend();
        let before = backend.entries()?;
        backend.amend_entry(StreamEntry::snapshot(ts(100), state(1)), ts(100))?;
        assert_eq!(backend.entries()?, before);
        Ok(())
    }

    #[test]
    fn test_for_each_stops_on_error() -> Result<()> {
        let backend = seeded_backend();
        let mut seen = 0;
        let result = backend.for_each_entry(&mut |_| {
            seen += 1;
            if seen == 3 {
                Err(Error::Storage("stop".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(seen, 3);
        Ok(())
    }
}
