//! Press-cycle signal tracking.
//!
//! The poller samples one boolean PLC tag, turns level changes into timed
//! transitions and stores the latest ON and OFF phase in SQLite. The cycle
//! reader derives stall, plausibility and the displayed cycle time from
//! those two rows.

pub mod config;
pub mod cycle;
pub mod db;
pub mod error;
pub mod poller;
pub mod utils;

use anyhow::Result;

/// Resolves when the process is asked to stop (Ctrl-C, or SIGTERM on Unix).
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
