// Timestamp primitives for the state stream
//
// Every entry, cursor position and rate threshold in the stream is measured
// on a single millisecond-precision timeline.

use std::fmt;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A millisecond-precision point on the stream timeline
///
/// Stored as milliseconds since the Unix epoch. All duration arithmetic in
/// the crate (rate thresholds, rewind/fast-forward bounds) uses the same
/// millisecond unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch
    pub const EPOCH: Timestamp = Timestamp(0);

    /// The current wall-clock time
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Create a timestamp from milliseconds since the Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch
    pub fn millis(&self) -> i64 {
        self.0
    }

    /// This timestamp shifted by `millis` (negative values shift backward)
    pub fn add_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Signed millisecond distance from `earlier` to this timestamp
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}
