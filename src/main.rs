use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{info, warn};

use conveyor_monitor::{
    config::{PollerConfig, Settings},
    db::Database,
    poller::{
        Clock, ModbusConnector, PlcConnector, Poller, PollerController, SimulatedPress,
        SystemClock, TagAddress,
    },
    shutdown_signal,
    utils::{init_logging, level_from_verbosity},
};

/// Polls the press signal on the PLC and records each ON/OFF transition
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// JSON settings file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// PLC address as host:port
    #[arg(long, value_name = "ADDR")]
    plc: Option<SocketAddr>,

    /// Modbus unit id of the PLC
    #[arg(long)]
    unit_id: Option<u8>,

    /// Tag to sample: coil:<n> or discrete:<n>
    #[arg(long)]
    tag: Option<TagAddress>,

    /// Milliseconds between samples (minimum 50)
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Milliseconds to wait after a fault before reconnecting
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Failed reads tolerated before forcing a reconnect
    #[arg(long)]
    read_retries: Option<u32>,

    /// SQLite file shared with the cycle reader
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Drive the loop from a simulated press instead of the PLC
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn apply(&self, config: &mut PollerConfig) {
        if let Some(plc) = self.plc {
            config.plc_address = plc;
        }
        if let Some(unit_id) = self.unit_id {
            config.unit_id = unit_id;
        }
        if let Some(tag) = self.tag {
            config.tag = tag;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = self.backoff_ms {
            config.backoff_ms = ms;
        }
        if let Some(retries) = self.read_retries {
            config.read_retries = retries;
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(level_from_verbosity(args.verbose, args.quiet));

    let mut config = Settings::load(args.config.as_deref())?.poller;
    args.apply(&mut config);
    config.validate().context("invalid poller configuration")?;

    info!("conveyor poller starting up...");
    let db = Database::new(config.store_path.clone())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let connector: Arc<dyn PlcConnector> = if args.simulate {
        Arc::new(SimulatedPress::new(
            Arc::clone(&clock),
            Duration::from_secs(13),
            Duration::from_secs(15),
        ))
    } else {
        Arc::new(ModbusConnector::new(&config))
    };

    warn!("Reading from press. DO NOT TOUCH!");

    let mut controller = PollerController::new();
    controller
        .start(Poller::new(connector, db, clock, config))
        .await?;

    shutdown_signal()
        .await
        .context("failed to listen for shutdown signal")?;

    let stats = controller.stop().await?;
    info!(
        "poller exited after {} connection attempt(s) and {} fault(s)",
        stats.connection_attempts, stats.faults
    );
    Ok(())
}
