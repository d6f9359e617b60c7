//! Sluice producer binary.
//!
//! Generates blocks at `frequency` times the base rate and serves them to
//! TCP clients:
//!
//! ```bash
//! sluice-producer -p 1.5 localhost:5566
//! sluice-producer -p 2 --max-clients 64 --on-full-ring exit 5566
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use clap::{Parser, ValueEnum};
use sluice_core::{Endpoint, Geometry};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sluice_server::{bounded, Distributor, DistributorConfig, Generator, OverflowPolicy};

/// What to do when a client arrives and the admission ring is full.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OnFullRing {
    /// Close the new connection and keep going.
    #[default]
    Reject,
    /// Stop the producer.
    Exit,
}

impl From<OnFullRing> for OverflowPolicy {
    fn from(value: OnFullRing) -> Self {
        match value {
            OnFullRing::Reject => Self::Reject,
            OnFullRing::Exit => Self::Exit,
        }
    }
}

/// Sluice producer.
#[derive(Parser, Debug)]
#[command(name = "sluice-producer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Generation rate multiplier (base rate is 2662 bytes/s).
    #[arg(short = 'p', long, value_parser = parse_frequency)]
    frequency: f64,

    /// Address to listen on: `port`, `host:port` or `[host]:port`.
    #[arg(value_parser = parse_endpoint)]
    address: Endpoint,

    /// Channel capacity in bytes.
    #[arg(long, default_value = "65536")]
    channel_capacity: u32,

    /// Most clients that may wait for capacity at once.
    #[arg(long, default_value = "1000")]
    max_clients: u32,

    /// Seconds between channel reports.
    #[arg(long, default_value = "5")]
    report_interval_secs: u64,

    /// Longest a readiness poll may wait, in milliseconds.
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    poll_timeout_ms: u64,

    /// Behaviour when the admission ring is full.
    #[arg(long, value_enum, default_value = "reject")]
    on_full_ring: OnFullRing,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

/// Parses a strictly positive, finite frequency.
fn parse_frequency(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("invalid frequency '{s}'"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("frequency must be positive, got {value}"));
    }
    Ok(value)
}

fn parse_endpoint(s: &str) -> Result<Endpoint, String> {
    Endpoint::parse(s).map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with anything on stdout.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let geometry = Geometry::new()
        .with_channel_capacity(args.channel_capacity)
        .with_max_clients(args.max_clients);
    let config = DistributorConfig::new(args.address.resolve()?, args.frequency)
        .with_geometry(geometry)
        .with_report_interval(Duration::from_secs(args.report_interval_secs))
        .with_poll_timeout(Duration::from_millis(args.poll_timeout_ms))
        .with_overflow_policy(args.on_full_ring.into());
    config.validate()?;

    info!(
        address = %args.address,
        frequency = args.frequency,
        channel_capacity = geometry.channel_capacity_bytes,
        max_clients = geometry.max_clients,
        "Starting Sluice producer"
    );

    let (writer, reader) = bounded(geometry.channel_capacity_bytes as usize);
    let generator = Generator::new(writer, &config)?.spawn()?;

    let mut distributor = Distributor::bind(config, reader).await?;
    let shutdown = distributor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.notify_one();
        }
    });

    let result = distributor.run().await;
    let snapshot = distributor.snapshot();
    info!(stats = %snapshot.stats, "Distributor stopped");

    // Dropping the channel reader lets the generator finish.
    drop(distributor);
    match generator.join() {
        Ok(stats) => info!(chunks = stats.chunks_written, "Generator joined"),
        Err(_) => tracing::error!("Generator thread panicked"),
    }

    result?;
    Ok(())
}
