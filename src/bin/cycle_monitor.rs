use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};
use tokio::time::MissedTickBehavior;

use conveyor_monitor::{
    config::Settings,
    cycle::{CycleMonitor, SignalReader},
    db::Database,
    shutdown_signal,
    utils::{init_logging, level_from_verbosity},
};

/// Follows the signal store and reports completed cycles, the current cycle
/// time and line stalls
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// JSON settings file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite file written by the poller
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Shortest plausible full cycle, in seconds
    #[arg(long)]
    min_cycle: Option<f64>,

    /// Longest plausible full cycle, in seconds; also the stall threshold
    #[arg(long)]
    max_cycle: Option<f64>,

    /// Print each status as a JSON line instead of log output
    #[arg(long, default_value_t = false)]
    json: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(level_from_verbosity(args.verbose, args.quiet));

    let mut config = Settings::load(args.config.as_deref())?.reader;
    if let Some(store) = args.store {
        config.store_path = store;
    }
    if let Some(min) = args.min_cycle {
        config.bounds.min_secs = min;
    }
    if let Some(max) = args.max_cycle {
        config.bounds.max_secs = max;
    }
    config.validate().context("invalid reader configuration")?;

    let db = Database::open_read_only(config.store_path.clone()).with_context(|| {
        format!(
            "cannot open signal store {}; is the poller writing to it?",
            config.store_path.display()
        )
    })?;
    let mut monitor = CycleMonitor::new(SignalReader::new(db), &config).await?;
    info!(
        "watching {} (plausible cycle {}s..={}s)",
        config.store_path.display(),
        config.bounds.min_secs,
        config.bounds.max_secs
    );

    let mut ticker = tokio::time::interval(config.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut was_stalled = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = &mut shutdown => {
                result.context("failed to listen for shutdown signal")?;
                break;
            }
        }

        let status = match monitor.poll(Utc::now()).await {
            Ok(status) => status,
            Err(err) => {
                error!("failed to read signal store: {err:?}");
                continue;
            }
        };

        if args.json {
            println!("{}", serde_json::to_string(&status)?);
            continue;
        }

        if status.cycle_completed {
            if status.plausible {
                info!(
                    "cycle complete: {:.1}s (current {:.1}s)",
                    status.observed_cycle_secs, status.current_cycle_secs
                );
            } else {
                warn!(
                    "cycle complete but {:.1}s is outside bounds; keeping {:.1}s",
                    status.observed_cycle_secs, status.current_cycle_secs
                );
            }
        }

        if status.stalled && !was_stalled {
            warn!("line stalled: no transition since {}", status.last_change.to_rfc3339());
        } else if !status.stalled && was_stalled {
            info!("line moving again");
        }
        was_stalled = status.stalled;
    }

    info!("cycle monitor stopped");
    Ok(())
}
