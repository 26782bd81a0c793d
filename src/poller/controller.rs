use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{Poller, PollerStats};

/// Owns the background poll task and its shutdown token.
pub struct PollerController {
    handle: Option<JoinHandle<PollerStats>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for PollerController {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn start(&mut self, poller: Poller) -> Result<()> {
        if self.handle.is_some() {
            bail!("poller already running");
        }

        poller.prepare().await?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Signals the loop to exit and waits for it to close the PLC link.
    pub async fn stop(&mut self) -> Result<PollerStats> {
        if let Some(token) = self.cancel_token.take() {
            info!("Stop requested; shutting down poll loop");
            token.cancel();
        }

        match self.handle.take() {
            Some(handle) => handle.await.context("poll loop task failed to join"),
            None => Ok(PollerStats::default()),
        }
    }
}
