//! Startup configuration for both binaries.
//!
//! A JSON settings file (optional) provides the base values; command-line
//! flags override single fields. Both sections default to the plant
//! deployment, so an absent file or an empty `{}` is valid.

use std::{
    fs,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::poller::link::TagAddress;

/// Lower bound on the poll interval. Keeps bus and CPU load bounded.
pub const MIN_POLL_INTERVAL_MS: u64 = 50;

const DEFAULT_STORE_FILE: &str = "signal.sqlite";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerConfig {
    pub plc_address: SocketAddr,
    pub unit_id: u8,
    pub tag: TagAddress,
    pub poll_interval_ms: u64,
    /// Fixed wait after every fault before reconnecting.
    pub backoff_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Failed reads tolerated on a live link before forcing a reconnect.
    pub read_retries: u32,
    pub store_path: PathBuf,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            plc_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(128, 1, 0, 123), 502)),
            unit_id: 1,
            tag: TagAddress::Coil(2),
            poll_interval_ms: 100,
            backoff_ms: 3_000,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 2_000,
            read_retries: 2,
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            bail!(
                "poll interval {}ms is below the {}ms minimum",
                self.poll_interval_ms,
                MIN_POLL_INTERVAL_MS
            );
        }
        if self.backoff_ms == 0 {
            bail!("reconnect backoff must be greater than zero");
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            bail!("connect and read timeouts must be greater than zero");
        }
        if self.store_path.as_os_str().is_empty() {
            bail!("store path is required");
        }
        Ok(())
    }
}

/// Accepted range for a full ON+OFF cycle, in seconds. Both ends inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CycleBounds {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for CycleBounds {
    fn default() -> Self {
        Self {
            min_secs: 23.0,
            max_secs: 36.0,
        }
    }
}

impl CycleBounds {
    pub fn validate(&self) -> Result<()> {
        if !self.min_secs.is_finite() || !self.max_secs.is_finite() {
            bail!("cycle bounds must be finite");
        }
        if self.min_secs < 0.0 {
            bail!("minimum cycle time cannot be negative");
        }
        if self.min_secs > self.max_secs {
            bail!(
                "minimum cycle time {}s exceeds maximum {}s",
                self.min_secs,
                self.max_secs
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    pub store_path: PathBuf,
    pub bounds: CycleBounds,
    /// Estimate shown until the first plausible cycle is observed.
    pub initial_cycle_secs: f64,
    pub refresh_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            bounds: CycleBounds::default(),
            initial_cycle_secs: 26.0,
            refresh_ms: 500,
        }
    }
}

impl ReaderConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        if !self.initial_cycle_secs.is_finite() || self.initial_cycle_secs < 0.0 {
            bail!("initial cycle estimate must be a non-negative number");
        }
        if self.refresh_ms == 0 {
            bail!("refresh interval must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub poller: PollerConfig,
    pub reader: ReaderConfig,
}

impl Settings {
    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_plant() {
        let settings = Settings::default();
        assert_eq!(settings.poller.plc_address.to_string(), "128.1.0.123:502");
        assert_eq!(settings.poller.tag, TagAddress::Coil(2));
        assert_eq!(settings.poller.backoff(), Duration::from_secs(3));
        assert_eq!(settings.reader.bounds, CycleBounds { min_secs: 23.0, max_secs: 36.0 });
        assert_eq!(settings.reader.initial_cycle_secs, 26.0);
        settings.poller.validate().unwrap();
        settings.reader.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"poller": {{"plc_address": "10.0.0.7:1502", "tag": "discrete:4"}},
                "reader": {{"bounds": {{"min_secs": 20.0, "max_secs": 40.0}}}}}}"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.poller.plc_address.to_string(), "10.0.0.7:1502");
        assert_eq!(settings.poller.tag, TagAddress::DiscreteInput(4));
        assert_eq!(settings.poller.poll_interval_ms, 100);
        assert_eq!(settings.reader.bounds.max_secs, 40.0);
        assert_eq!(settings.reader.refresh_ms, 500);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.json"))).is_err());
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }

    #[test]
    fn rejects_unsafe_poller_values() {
        let mut config = PollerConfig::default();
        config.poll_interval_ms = 10;
        assert!(config.validate().is_err());

        let mut config = PollerConfig::default();
        config.backoff_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_bounds() {
        let bounds = CycleBounds {
            min_secs: 40.0,
            max_secs: 30.0,
        };
        assert!(bounds.validate().is_err());
        assert!(CycleBounds { min_secs: -1.0, max_secs: 3.0 }.validate().is_err());
    }
}
