//! FilmMate Ctl - drive a FilmMate Tripod over BLE
//!
//! This binary runs one controller session:
//! - Scans for the tripod by advertised name
//! - Connects and picks the write + notify characteristic
//! - Sends a random command every interval and logs every notification
//!
//! Ctrl-C stops the session and tears the link down cleanly.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use filmmate_link::test_utils::MockCentral;
use filmmate_link::{Central, LinkConfig, LinkConfigBuilder, NotificationSink, TripodController};

#[derive(Parser)]
#[command(name = "filmmate-ctl")]
#[command(about = "Command/telemetry controller for the FilmMate Tripod")]
#[command(version)]
struct Args {
    /// Substring of the advertised device name to look for
    #[arg(long, short)]
    target: Option<String>,

    /// Scan window (e.g. "10s"); defaults to the adapter's window
    #[arg(long, value_parser = humantime::parse_duration)]
    scan_timeout: Option<Duration>,

    /// Wait after connecting before reading the service table (e.g. "5s")
    #[arg(long, value_parser = humantime::parse_duration)]
    settle: Option<Duration>,

    /// Wait between two commands (e.g. "5s")
    #[arg(long, short, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Stop after sending this many commands
    #[arg(long, short = 'n')]
    count: Option<u64>,

    /// JSON configuration file; flags override its values
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run against the built-in simulated tripod instead of a radio
    #[arg(long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    fn link_config(&self) -> anyhow::Result<LinkConfig> {
        let base = match &self.config {
            Some(path) => LinkConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => LinkConfig::default(),
        };

        let mut builder = LinkConfigBuilder::from_config(base);
        if let Some(target) = &self.target {
            builder = builder.target_name(target.clone());
        }
        if let Some(timeout) = self.scan_timeout {
            builder = builder.scan_timeout(timeout);
        }
        if let Some(settle) = self.settle {
            builder = builder.settle_delay(settle);
        }
        if let Some(interval) = self.interval {
            builder = builder.command_interval(interval);
        }
        if let Some(count) = self.count {
            builder = builder.max_commands(count);
        }
        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(args.verbose))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.link_config()?;
    info!(
        target_name = %config.target_name,
        interval = ?config.command.interval,
        "Starting FilmMate Ctl v{}",
        filmmate_link::VERSION
    );

    let central = open_central(args.simulate).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down...");
                ctrl_c.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let report = TripodController::new(config)
        .run(central.as_ref(), NotificationSink::logging(), cancel)
        .await?;

    info!(
        reason = ?report.reason,
        sent = report.commands_sent,
        received = report.notifications_received,
        dropped = report.notifications_dropped,
        "Done"
    );
    Ok(())
}

/// `RUST_LOG` wins; otherwise `--verbose` picks debug over info
fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

async fn open_central(simulate: bool) -> anyhow::Result<Box<dyn Central>> {
    if simulate {
        info!("Using the simulated tripod");
        return Ok(Box::new(MockCentral::filmmate()));
    }

    #[cfg(feature = "ble")]
    {
        let central = filmmate_link::BtleplugCentral::new()
            .await
            .context("opening the Bluetooth adapter")?;
        Ok(Box::new(central))
    }

    #[cfg(not(feature = "ble"))]
    {
        anyhow::bail!("built without the `ble` feature; rebuild with --features ble or pass --simulate")
    }
}
