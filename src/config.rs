// Configuration for a state stream

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rate thresholds for the write path, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRate {
    /// Minimum time between keyframes; a write further than this from the
    /// last snapshot becomes a new snapshot
    pub keyframe_frequency: u64,
    /// Minimum time between distinct mutations; a write closer than this to
    /// the last mutation amends it in place. Zero disables amendments.
    pub change_frequency: u64,
}

impl RecordRate {
    /// Create a rate config from explicit millisecond thresholds
    pub fn new(keyframe_frequency: u64, change_frequency: u64) -> Self {
        Self {
            keyframe_frequency,
            change_frequency,
        }
    }

    /// Check the thresholds are usable
    pub fn validate(&self) -> Result<()> {
        if self.keyframe_frequency == 0 {
            return Err(Error::InvalidConfig(
                "keyframe_frequency must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RecordRate {
    fn default() -> Self {
        Self {
            keyframe_frequency: 60_000,
            change_frequency: 1_000,
        }
    }
}

/// Configuration for a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Rate thresholds for incoming changes
    pub record_rate: RecordRate,
}

impl StreamConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        self.record_rate.validate()
    }
}
