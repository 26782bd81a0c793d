use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::{CycleBounds, ReaderConfig},
    db::{Database, SignalLevel, SignalPair, SignalRecord},
};

use super::observation::{self, CycleObservation};

/// Read-only view over the signal store. Never writes.
#[derive(Clone)]
pub struct SignalReader {
    db: Database,
}

impl SignalReader {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn pair(&self) -> Result<SignalPair> {
        self.db
            .read_signal_pair()
            .await
            .context("failed to read signal records")
    }

    /// Current row for `level`, or the uninitialized placeholder.
    pub async fn snapshot(&self, level: SignalLevel) -> Result<SignalRecord> {
        Ok(self.pair().await?.get(level).clone())
    }

    pub async fn last_change_instant(&self) -> Result<DateTime<Utc>> {
        Ok(observation::last_change_instant(&self.pair().await?))
    }

    pub async fn is_stalled(&self, now: DateTime<Utc>, max_cycle_secs: f64) -> Result<bool> {
        let obs = CycleObservation::from_pair(&self.pair().await?);
        Ok(obs.is_stalled(now, max_cycle_secs))
    }

    pub async fn observed_full_cycle(&self) -> Result<f64> {
        Ok(observation::observed_full_cycle(&self.pair().await?))
    }

    pub async fn cycle_is_plausible(&self, bounds: &CycleBounds) -> Result<bool> {
        let full_cycle = self.observed_full_cycle().await?;
        Ok(observation::cycle_is_plausible(full_cycle, bounds))
    }

    pub async fn current_cycle_estimate(
        &self,
        previous_secs: f64,
        bounds: &CycleBounds,
        is_stalled: bool,
    ) -> Result<f64> {
        let obs = CycleObservation::from_pair(&self.pair().await?);
        Ok(obs.estimate(previous_secs, bounds, is_stalled))
    }

    pub async fn level_transitioned(
        &self,
        level: SignalLevel,
        snapshot: &mut SignalRecord,
    ) -> Result<bool> {
        let pair = self.pair().await?;
        Ok(observation::level_transitioned(pair.get(level), snapshot))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatus {
    /// The ON row changed since the previous poll, i.e. a new cycle began.
    pub cycle_completed: bool,
    pub current_cycle_secs: f64,
    pub observed_cycle_secs: f64,
    pub plausible: bool,
    pub stalled: bool,
    pub last_change: DateTime<Utc>,
}

/// Consumer-side loop state: an ON-row snapshot plus the displayed cycle
/// estimate, refreshed once per `poll`.
pub struct CycleMonitor {
    reader: SignalReader,
    bounds: CycleBounds,
    on_snapshot: SignalRecord,
    current_cycle_secs: f64,
}

impl CycleMonitor {
    pub async fn new(reader: SignalReader, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let on_snapshot = reader.snapshot(SignalLevel::On).await?;
        Ok(Self {
            reader,
            bounds: config.bounds,
            on_snapshot,
            current_cycle_secs: config.initial_cycle_secs,
        })
    }

    pub fn current_cycle_secs(&self) -> f64 {
        self.current_cycle_secs
    }

    pub async fn poll(&mut self, now: DateTime<Utc>) -> Result<CycleStatus> {
        let pair = self.reader.pair().await?;
        let obs = CycleObservation::from_pair(&pair);
        let stalled = obs.is_stalled(now, self.bounds.max_secs);

        let cycle_completed = observation::level_transitioned(&pair.on, &mut self.on_snapshot);
        if cycle_completed {
            self.current_cycle_secs = obs.estimate(self.current_cycle_secs, &self.bounds, stalled);
        }

        Ok(CycleStatus {
            cycle_completed,
            current_cycle_secs: self.current_cycle_secs,
            observed_cycle_secs: obs.full_cycle_secs,
            plausible: obs.is_plausible(&self.bounds),
            stalled,
            last_change: obs.last_change,
        })
    }
}
