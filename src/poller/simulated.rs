//! Square-wave stand-in for the press, for bench runs without a PLC.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    clock::Clock,
    link::{PlcConnector, PlcLink},
};
use crate::error::LinkError;

#[derive(Debug, Clone, Copy)]
struct SquareWave {
    on_phase: Duration,
    off_phase: Duration,
    started_at: DateTime<Utc>,
}

impl SquareWave {
    /// Each cycle starts in its ON phase.
    fn level_at(&self, now: DateTime<Utc>) -> bool {
        let period = (self.on_phase + self.off_phase).as_millis().max(1) as i64;
        let elapsed = now
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .rem_euclid(period);
        elapsed < self.on_phase.as_millis() as i64
    }
}

pub struct SimulatedPress {
    clock: Arc<dyn Clock>,
    wave: SquareWave,
}

impl SimulatedPress {
    pub fn new(clock: Arc<dyn Clock>, on_phase: Duration, off_phase: Duration) -> Self {
        let wave = SquareWave {
            on_phase,
            off_phase,
            started_at: clock.now(),
        };
        Self { clock, wave }
    }
}

#[async_trait]
impl PlcConnector for SimulatedPress {
    async fn connect(&self) -> Result<Box<dyn PlcLink>, LinkError> {
        Ok(Box::new(SimulatedLink {
            clock: Arc::clone(&self.clock),
            wave: self.wave,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "simulated press ({:?} on / {:?} off)",
            self.wave.on_phase, self.wave.off_phase
        )
    }
}

struct SimulatedLink {
    clock: Arc<dyn Clock>,
    wave: SquareWave,
}

#[async_trait]
impl PlcLink for SimulatedLink {
    async fn read_tag(&mut self) -> Result<bool, LinkError> {
        Ok(self.wave.level_at(self.clock.now()))
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::clock::ManualClock;
    use chrono::TimeZone;

    #[tokio::test]
    async fn follows_the_configured_square_wave() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let press = SimulatedPress::new(
            Arc::new(clock.clone()),
            Duration::from_secs(12),
            Duration::from_secs(15),
        );
        let mut link = press.connect().await.unwrap();

        assert!(link.read_tag().await.unwrap());
        clock.advance(chrono::Duration::seconds(12));
        assert!(!link.read_tag().await.unwrap());
        clock.advance(chrono::Duration::seconds(15));
        assert!(link.read_tag().await.unwrap());
    }
}
