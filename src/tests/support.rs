// Test support for the state stream
//
// Fixture builders and minimal storage backends used across the test
// modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::delta::Delta;
use crate::entry::{EntryFilter, EntryKind, StreamEntry};
use crate::error::{Error, Result};
use crate::state::StateData;
use crate::storage::StorageBackend;
use crate::types::Timestamp;

/// An arbitrary fixed base on the timeline, offset in milliseconds
pub fn mock_time(offset_millis: i64) -> Timestamp {
    Timestamp::from_millis(1_700_000_000_000 + offset_millis)
}

/// Parse a JSON object literal into a state
pub fn object(json: &str) -> StateData {
    StateData::from_json(json).expect("valid state literal")
}

/// A small stream fixture: two snapshots with mutations between them
///
/// Resulting document states, by offset from the base:
///   -10s  {"hello": "world"}          (snapshot)
///    -9s  {"hello": {"there": 1}}
///    -8s  {"hello": {"there": 2}}
///    -7s  {"hello": null}
///    -6s  {"hello": true}             (snapshot)
///    -5s  {"hello": true, "goodbye": 4}
pub fn sample_entries() -> Vec<StreamEntry> {
    let states = sample_states();
    let mut entries = Vec::new();
    for (i, (at, state)) in states.iter().enumerate() {
        let snapshot = i == 0 || i == 4;
        if snapshot {
            entries.push(StreamEntry::snapshot(*at, state.clone()));
        } else {
            let (_, prev) = &states[i - 1];
            entries.push(StreamEntry::mutation(*at, Delta::build(prev, state)));
        }
    }
    entries
}

/// The document states behind [`sample_entries`], ascending by timestamp
pub fn sample_states() -> Vec<(Timestamp, StateData)> {
    vec![
        (mock_time(-10_000), object(r#"{"hello": "world"}"#)),
        (mock_time(-9_000), object(r#"{"hello": {"there": 1}}"#)),
        (mock_time(-8_000), object(r#"{"hello": {"there": 2}}"#)),
        (mock_time(-7_000), object(r#"{"hello": null}"#)),
        (mock_time(-6_000), object(r#"{"hello": true}"#)),
        (mock_time(-5_000), object(r#"{"hello": true, "goodbye": 4}"#)),
    ]
}

/// A linear-scan storage backend for cursor tests
///
/// Honest but unoptimized; keeps its entries sorted by timestamp.
pub struct MockBackend {
    entries: Mutex<Vec<StreamEntry>>,
}

impl MockBackend {
    pub fn new(mut entries: Vec<StreamEntry>) -> Self {
        entries.sort_by_key(|entry| entry.timestamp);
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl StorageBackend for MockBackend {
    fn get_snapshot_before(&self, timestamp: Timestamp) -> Result<Option<StreamEntry>> {
        let entries = self.entries.lock().expect("mock entries lock");
        Ok(entries
            .iter()
            .filter(|entry| {
                entry.timestamp <= timestamp && entry.kind() == EntryKind::Snapshot
            })
            .last()
            .cloned())
    }

    fn get_entry_after(
        &self,
        timestamp: Timestamp,
        filter: EntryFilter,
    ) -> Result<Option<StreamEntry>> {
        let entries = self.entries.lock().expect("mock entries lock");
        Ok(entries
            .iter()
            .find(|entry| entry.timestamp > timestamp && filter.matches(entry.kind()))
            .cloned())
    }

    fn save_entry(&self, entry: StreamEntry) -> Result<()> {
        let mut entries = self.entries.lock().expect("mock entries lock");
        entries.push(entry);
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(())
    }

    fn amend_entry(&self, entry: StreamEntry, old_timestamp: Timestamp) -> Result<()> {
        let mut entries = self.entries.lock().expect("mock entries lock");
        match entries
            .iter_mut()
            .find(|existing| existing.timestamp == old_timestamp)
        {
            Some(existing) => {
                *existing = entry;
                Ok(())
            }
            None => Err(Error::Storage("entry not found".to_string())),
        }
    }

    fn for_each_entry(&self, cb: &mut dyn FnMut(&StreamEntry) -> Result<()>) -> Result<()> {
        let entries = self.entries.lock().expect("mock entries lock");
        for entry in entries.iter() {
            cb(entry)?;
        }
        Ok(())
    }
}

/// A backend that returns a mutation from snapshot lookups
pub struct MisbehavingBackend;

impl StorageBackend for MisbehavingBackend {
    fn get_snapshot_before(&self, timestamp: Timestamp) -> Result<Option<StreamEntry>> {
        let before = StateData::new();
        let after = object(r#"{"bogus": true}"#);
        Ok(Some(StreamEntry::mutation(
            timestamp.add_millis(-1_000),
            Delta::build(&before, &after),
        )))
    }

    fn get_entry_after(
        &self,
        _timestamp: Timestamp,
        _filter: EntryFilter,
    ) -> Result<Option<StreamEntry>> {
        Ok(None)
    }

    fn save_entry(&self, _entry: StreamEntry) -> Result<()> {
        Ok(())
    }

    fn amend_entry(&self, _entry: StreamEntry, _old_timestamp: Timestamp) -> Result<()> {
        Ok(())
    }

    fn for_each_entry(&self, _cb: &mut dyn FnMut(&StreamEntry) -> Result<()>) -> Result<()> {
        Ok(())
    }
}

/// A wrapper that counts snapshot-filtered `get_entry_after` probes
pub struct ProbeCountingBackend<B> {
    inner: B,
    snapshot_probes: AtomicUsize,
}

impl<B> ProbeCountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            snapshot_probes: AtomicUsize::new(0),
        }
    }

    pub fn snapshot_probes(&self) -> usize {
        self.snapshot_probes.load(Ordering::SeqCst)
    }
}

impl<B: StorageBackend> StorageBackend for ProbeCountingBackend<B> {
    fn get_snapshot_before(&self, timestamp: Timestamp) -> Result<Option<StreamEntry>> {
        self.inner.get_snapshot_before(timestamp)
    }

    fn get_entry_after(
        &self,
        timestamp: Timestamp,
        filter: EntryFilter,
    ) -> Result<Option<StreamEntry>> {
        if filter == EntryFilter::Snapshot {
            self.snapshot_probes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.get_entry_after(timestamp, filter)
    }

    fn save_entry(&self, entry: StreamEntry) -> Result<()> {
        self.inner.save_entry(entry)
    }

    fn amend_entry(&self, entry: StreamEntry, old_timestamp: Timestamp) -> Result<()> {
        self.inner.amend_entry(entry, old_timestamp)
    }

    fn for_each_entry(&self, cb: &mut dyn FnMut(&StreamEntry) -> Result<()>) -> Result<()> {
        self.inner.for_each_entry(cb)
    }
}
