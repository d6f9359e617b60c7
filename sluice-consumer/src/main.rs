//! Sluice consumer binary.
//!
//! ```bash
//! sluice-consumer -p 1.0 -d 0.5 -c 4 localhost:5566
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use clap::Parser;
use sluice_core::Endpoint;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use sluice_consumer::{Consumer, ConsumerConfig};

/// Sluice consumer.
#[derive(Parser, Debug)]
#[command(name = "sluice-consumer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Consumption rate multiplier (base rate is 4435 bytes/s).
    #[arg(short = 'p', long)]
    consumption: f64,

    /// Storage degradation multiplier (base rate is 819 bytes/s).
    #[arg(short = 'd', long)]
    degradation: f64,

    /// Storage size in units of 30720 bytes.
    #[arg(short = 'c', long)]
    capacity: u32,

    /// Producer address: `port`, `host:port` or `[host]:port`.
    #[arg(value_parser = parse_endpoint)]
    address: Endpoint,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn parse_endpoint(s: &str) -> Result<Endpoint, String> {
    Endpoint::parse(s).map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ConsumerConfig::new(
        args.address.resolve()?,
        args.consumption,
        args.degradation,
        args.capacity,
    );
    let summary = Consumer::new(config)?.run().await?;
    summary.emit();
    Ok(())
}
