use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    config::PollerConfig,
    db::Database,
    error::{FaultKind, LinkError},
};

use super::{
    clock::Clock,
    edge::{EdgeDetector, TransitionEvent},
    link::PlcConnector,
};

// Set to false to silence per-transition logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub connection_attempts: u64,
    pub faults: u64,
    pub events_written: u64,
}

/// Everything the poll loop owns: the link factory, the store handle, the
/// edge detector and its counters.
pub struct Poller {
    connector: Arc<dyn PlcConnector>,
    db: Database,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    detector: EdgeDetector,
    stats: PollerStats,
}

impl Poller {
    pub fn new(
        connector: Arc<dyn PlcConnector>,
        db: Database,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self {
            connector,
            db,
            clock,
            config,
            detector: EdgeDetector::new(),
            stats: PollerStats::default(),
        }
    }

    /// Makes sure both signal rows exist before the first transition.
    pub async fn prepare(&self) -> Result<()> {
        let created = self
            .db
            .initialize_signals(self.clock.now())
            .await
            .context("failed to initialize signal records")?;
        if created > 0 {
            log_info!("created {created} signal record(s) in {}", self.db.path().display());
        }
        Ok(())
    }

    /// Connect-and-poll until `cancel_token` fires. Faults never end the loop.
    pub async fn run(mut self, cancel_token: CancellationToken) -> PollerStats {
        let backoff = self.config.backoff();
        log_info!("polling {}", self.connector.describe());

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            match self.run_session(&cancel_token).await {
                Ok(()) => break,
                Err(fault) => {
                    self.stats.faults += 1;
                    self.detector.reset();
                    log_warn!(
                        "lost PLC link ({:?}): {fault}; reconnecting in {:?}",
                        fault.kind(),
                        backoff
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        log_info!(
            "poll loop stopped: {} connection attempt(s), {} fault(s), {} transition(s) written",
            self.stats.connection_attempts,
            self.stats.faults,
            self.stats.events_written
        );
        self.stats
    }

    /// One connection lifetime. Returns `Ok` only on cancellation.
    async fn run_session(&mut self, cancel_token: &CancellationToken) -> Result<(), LinkError> {
        self.stats.connection_attempts += 1;

        let mut link = tokio::select! {
            result = self.connector.connect() => result?,
            _ = cancel_token.cancelled() => return Ok(()),
        };
        log_info!("connected to PLC");

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failed_reads: u32 = 0;

        let outcome = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel_token.cancelled() => break Ok(()),
            }

            let sample = tokio::select! {
                result = link.read_tag() => result,
                _ = cancel_token.cancelled() => break Ok(()),
            };

            match sample {
                Ok(sample) => {
                    failed_reads = 0;
                    self.handle_sample(sample).await;
                }
                Err(err)
                    if err.kind() == FaultKind::TransientRead
                        && failed_reads < self.config.read_retries =>
                {
                    failed_reads += 1;
                    log_warn!(
                        "tag read failed ({failed_reads}/{}): {err}",
                        self.config.read_retries
                    );
                }
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(()) => {
                link.close().await;
                log_info!("PLC link closed");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn handle_sample(&mut self, sample: bool) {
        let now = self.clock.now();
        let Some(event) = self.detector.observe(sample, now) else {
            return;
        };

        match self.persist(&event).await {
            Ok(()) => {
                self.stats.events_written += 1;
                log_debug!(
                    "{} after {:.2}s at {}",
                    event.level,
                    event.duration_secs,
                    event.at.to_rfc3339()
                );
            }
            Err(err) => log_error!("failed to store {} transition: {err:?}", event.level),
        }
    }

    async fn persist(&self, event: &TransitionEvent) -> Result<()> {
        self.db
            .write_signal(&event.to_record())
            .await
            .with_context(|| format!("write of {} record failed", event.level))
    }
}
