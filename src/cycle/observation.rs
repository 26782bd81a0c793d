//! Cycle statistics derived from the two signal rows.
//!
//! Everything here is a pure function of a [`SignalPair`], so it can be
//! tested without a store. Only the two latest half-cycles are known; the
//! rows may even belong to different cycles when read mid-update.

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    config::CycleBounds,
    db::{SignalPair, SignalRecord},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleObservation {
    /// ON duration plus OFF duration, in seconds.
    pub full_cycle_secs: f64,
    pub last_change: DateTime<Utc>,
}

impl CycleObservation {
    pub fn from_pair(pair: &SignalPair) -> Self {
        Self {
            full_cycle_secs: observed_full_cycle(pair),
            last_change: last_change_instant(pair),
        }
    }

    /// True when nothing has changed for strictly longer than `max_cycle_secs`.
    pub fn is_stalled(&self, now: DateTime<Utc>, max_cycle_secs: f64) -> bool {
        now.signed_duration_since(self.last_change) > secs_to_delta(max_cycle_secs)
    }

    pub fn is_plausible(&self, bounds: &CycleBounds) -> bool {
        cycle_is_plausible(self.full_cycle_secs, bounds)
    }

    /// Hysteresis: only a plausible cycle on a moving line replaces `previous`.
    pub fn estimate(&self, previous_secs: f64, bounds: &CycleBounds, is_stalled: bool) -> f64 {
        if self.is_plausible(bounds) && !is_stalled {
            self.full_cycle_secs
        } else {
            previous_secs
        }
    }
}

pub fn last_change_instant(pair: &SignalPair) -> DateTime<Utc> {
    pair.on
        .transition_timestamp
        .max(pair.off.transition_timestamp)
}

pub fn observed_full_cycle(pair: &SignalPair) -> f64 {
    pair.on.duration_since_last_transition + pair.off.duration_since_last_transition
}

pub fn cycle_is_plausible(full_cycle_secs: f64, bounds: &CycleBounds) -> bool {
    (bounds.min_secs..=bounds.max_secs).contains(&full_cycle_secs)
}

/// Returns true and refreshes `snapshot` when `live` differs from it in any field.
pub fn level_transitioned(live: &SignalRecord, snapshot: &mut SignalRecord) -> bool {
    if live == snapshot {
        return false;
    }
    *snapshot = live.clone();
    true
}

fn secs_to_delta(secs: f64) -> TimeDelta {
    TimeDelta::microseconds((secs * 1_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SignalLevel;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn pair(on_secs: f64, off_secs: f64, on_at: i64, off_at: i64) -> SignalPair {
        SignalPair {
            on: SignalRecord::new(SignalLevel::On, on_secs, at(on_at)),
            off: SignalRecord::new(SignalLevel::Off, off_secs, at(off_at)),
        }
    }

    fn bounds() -> CycleBounds {
        CycleBounds::default()
    }

    #[test]
    fn full_cycle_and_last_change_come_from_both_rows() {
        let obs = CycleObservation::from_pair(&pair(14.5, 12.25, 100, 88));
        assert_eq!(obs.full_cycle_secs, 26.75);
        assert_eq!(obs.last_change, at(100));

        let obs = CycleObservation::from_pair(&pair(14.5, 12.25, 100, 114));
        assert_eq!(obs.last_change, at(114));
    }

    #[test]
    fn plausibility_is_inclusive_at_both_bounds() {
        assert!(cycle_is_plausible(29.9, &bounds()));
        assert!(cycle_is_plausible(23.0, &bounds()));
        assert!(cycle_is_plausible(36.0, &bounds()));
        assert!(!cycle_is_plausible(22.99, &bounds()));
        assert!(!cycle_is_plausible(36.01, &bounds()));
    }

    #[test]
    fn uninitialized_rows_are_never_plausible() {
        let zero = SignalPair {
            on: SignalRecord::uninitialized(SignalLevel::On),
            off: SignalRecord::uninitialized(SignalLevel::Off),
        };
        let obs = CycleObservation::from_pair(&zero);
        assert!(!obs.is_plausible(&bounds()));
        assert!(obs.is_stalled(at(0), 36.0));
        assert_eq!(obs.estimate(26.0, &bounds(), false), 26.0);
    }

    #[test]
    fn stall_threshold_is_exclusive() {
        let obs = CycleObservation::from_pair(&pair(12.0, 14.0, 0, 10));

        assert!(!obs.is_stalled(at(46), 36.0));
        assert!(obs.is_stalled(at(46) + TimeDelta::milliseconds(1), 36.0));
        assert!(!obs.is_stalled(at(20), 36.0));
    }

    #[test]
    fn estimate_holds_through_bad_readings() {
        let implausible = CycleObservation::from_pair(&pair(30.0, 20.0, 0, 50));
        assert_eq!(implausible.estimate(26.0, &bounds(), false), 26.0);

        let plausible = CycleObservation::from_pair(&pair(13.0, 15.5, 0, 28));
        assert_eq!(plausible.estimate(26.0, &bounds(), true), 26.0);
        assert_eq!(plausible.estimate(26.0, &bounds(), false), 28.5);
    }

    #[test]
    fn snapshot_updates_only_on_change() {
        let live = SignalRecord::new(SignalLevel::On, 12.0, at(40));
        let mut snapshot = SignalRecord::new(SignalLevel::On, 12.0, at(13));

        assert!(level_transitioned(&live, &mut snapshot));
        assert_eq!(snapshot, live);
        assert!(!level_transitioned(&live, &mut snapshot));

        // Same timestamp, new duration still counts as a change.
        let rewritten = SignalRecord::new(SignalLevel::On, 12.5, at(40));
        assert!(level_transitioned(&rewritten, &mut snapshot));
    }
}
