//! Durable signal-state rows.
//!
//! The `conveyor_signal` table holds exactly one row per [`SignalLevel`].
//! Each row describes the phase that ended when its level was last entered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SignalLevel {
    Off,
    On,
}

impl SignalLevel {
    pub const ALL: [SignalLevel; 2] = [SignalLevel::Off, SignalLevel::On];

    /// Primary key stored in the `level` column.
    pub fn as_i64(self) -> i64 {
        match self {
            SignalLevel::Off => 0,
            SignalLevel::On => 1,
        }
    }

    pub fn from_sample(sample: bool) -> Self {
        if sample {
            SignalLevel::On
        } else {
            SignalLevel::Off
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            SignalLevel::Off => SignalLevel::On,
            SignalLevel::On => SignalLevel::Off,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalLevel::Off => "OFF",
            SignalLevel::On => "ON",
        }
    }
}

impl std::fmt::Display for SignalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub level: SignalLevel,
    /// Seconds spent in the opposite level before this level was entered.
    pub duration_since_last_transition: f64,
    pub transition_timestamp: DateTime<Utc>,
}

impl SignalRecord {
    pub fn new(level: SignalLevel, duration_secs: f64, at: DateTime<Utc>) -> Self {
        Self {
            level,
            duration_since_last_transition: duration_secs.max(0.0),
            transition_timestamp: at,
        }
    }

    /// Placeholder for a row the poller has not created yet.
    pub fn uninitialized(level: SignalLevel) -> Self {
        Self {
            level,
            duration_since_last_transition: 0.0,
            transition_timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Both rows read back to back. They may describe different cycles when a
/// read lands between the poller's two writes.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPair {
    pub on: SignalRecord,
    pub off: SignalRecord,
}

impl SignalPair {
    pub fn get(&self, level: SignalLevel) -> &SignalRecord {
        match level {
            SignalLevel::On => &self.on,
            SignalLevel::Off => &self.off,
        }
    }
}
