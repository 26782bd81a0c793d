//! Edge detection over raw tag samples.
//!
//! The detector only remembers what it has seen since the last reset. It
//! never looks at the store, so a restart or a link fault puts it back in
//! [`ObservedLevel::Unknown`] no matter what the durable rows say.

use chrono::{DateTime, Utc};

use crate::db::{SignalLevel, SignalRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedLevel {
    Unknown,
    On,
    Off,
}

impl From<SignalLevel> for ObservedLevel {
    fn from(level: SignalLevel) -> Self {
        match level {
            SignalLevel::On => ObservedLevel::On,
            SignalLevel::Off => ObservedLevel::Off,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub level: SignalLevel,
    /// Seconds spent in the opposite level.
    pub duration_secs: f64,
    pub at: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn to_record(&self) -> SignalRecord {
        SignalRecord::new(self.level, self.duration_secs, self.at)
    }
}

#[derive(Debug, Clone)]
pub struct EdgeDetector {
    observed: ObservedLevel,
    last_on_at: Option<DateTime<Utc>>,
    last_off_at: Option<DateTime<Utc>>,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self {
            observed: ObservedLevel::Unknown,
            last_on_at: None,
            last_off_at: None,
        }
    }

    pub fn observed(&self) -> ObservedLevel {
        self.observed
    }

    /// Forgets every sample seen so far.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feeds one sample taken at `now`. Returns an event only when the sample
    /// flips a known level.
    pub fn observe(&mut self, sample: bool, now: DateTime<Utc>) -> Option<TransitionEvent> {
        let level = SignalLevel::from_sample(sample);

        match (self.observed, level) {
            (ObservedLevel::Unknown, _) => {
                // First sample: adopt it and use its time as the phase start.
                self.enter(level, now);
                None
            }
            (ObservedLevel::Off, SignalLevel::On) | (ObservedLevel::On, SignalLevel::Off) => {
                let phase_start = self.entered_at(level.opposite()).unwrap_or(now);
                let elapsed = now.signed_duration_since(phase_start);
                let duration_secs = (elapsed.num_microseconds().unwrap_or(i64::MAX) as f64
                    / 1_000_000.0)
                    .max(0.0);
                self.enter(level, now);
                Some(TransitionEvent {
                    level,
                    duration_secs,
                    at: now,
                })
            }
            _ => None,
        }
    }

    fn enter(&mut self, level: SignalLevel, now: DateTime<Utc>) {
        self.observed = level.into();
        match level {
            SignalLevel::On => self.last_on_at = Some(now),
            SignalLevel::Off => self.last_off_at = Some(now),
        }
    }

    fn entered_at(&self, level: SignalLevel) -> Option<DateTime<Utc>> {
        match level {
            SignalLevel::On => self.last_on_at,
            SignalLevel::Off => self.last_off_at,
        }
    }
}
