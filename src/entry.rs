// Entry model for the state stream
//
// A stream is an ordered-by-timestamp log of entries. Each entry is either
// a snapshot (a full copy of the document, sufficient to start replay) or a
// mutation (a delta against the state immediately before it).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::delta::Delta;
use crate::state::StateData;
use crate::types::Timestamp;

/// The kind of a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// A full state keyframe
    Snapshot = 0,
    /// A delta against the preceding state
    Mutation = 1,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Snapshot => write!(f, "snapshot"),
            EntryKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// Filter argument for entry queries
///
/// `Any` matches every kind. It exists only as a query filter and cannot
/// appear in stored entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryFilter {
    /// Match only snapshots
    Snapshot = 0,
    /// Match only mutations
    Mutation = 1,
    /// Match every entry kind
    Any = 2,
}

impl EntryFilter {
    /// Whether an entry of `kind` passes this filter
    pub fn matches(&self, kind: EntryKind) -> bool {
        match self {
            EntryFilter::Snapshot => kind == EntryKind::Snapshot,
            EntryFilter::Mutation => kind == EntryKind::Mutation,
            EntryFilter::Any => true,
        }
    }
}

impl From<EntryKind> for EntryFilter {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Snapshot => EntryFilter::Snapshot,
            EntryKind::Mutation => EntryFilter::Mutation,
        }
    }
}

/// The payload of a stream entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EntryData {
    /// A full document state
    Snapshot(StateData),
    /// A delta against the preceding state
    Mutation(Delta),
}

/// An entry in the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// When the entry was recorded
    pub timestamp: Timestamp,
    /// The kind-tagged payload
    #[serde(flatten)]
    pub data: EntryData,
}

impl StreamEntry {
    /// Create a snapshot entry
    pub fn snapshot(timestamp: Timestamp, state: StateData) -> Self {
        Self {
            timestamp,
            data: EntryData::Snapshot(state),
        }
    }

    /// Create a mutation entry
    pub fn mutation(timestamp: Timestamp, delta: Delta) -> Self {
        Self {
            timestamp,
            data: EntryData::Mutation(delta),
        }
    }

    /// The kind of this entry
    pub fn kind(&self) -> EntryKind {
        match self.data {
            EntryData::Snapshot(_) => EntryKind::Snapshot,
            EntryData::Mutation(_) => EntryKind::Mutation,
        }
    }

    /// The snapshot state, when this entry is a snapshot
    pub fn as_snapshot(&self) -> Option<&StateData> {
        match &self.data {
            EntryData::Snapshot(state) => Some(state),
            EntryData::Mutation(_) => None,
        }
    }

    /// The delta, when this entry is a mutation
    pub fn as_mutation(&self) -> Option<&Delta> {
        match &self.data {
            EntryData::Snapshot(_) => None,
            EntryData::Mutation(delta) => Some(delta),
        }
    }
}
