//! # Load Generation Benchmark - Main Entry Point
//!
//! Runs every selected target from the compiled-in server list one after the
//! other, then prints a single comparative report on stdout. Logs go to
//! stderr; `RUST_LOG` controls their verbosity and `LOG_MESSAGES=1` adds a line
//! per received payload.
//!
//! Connection and send failures never fail the process: a target nobody could
//! connect to still reports an average of 0.

use anyhow::{Context, Result};
use clap::Parser;
use loadgen_benchmark::{
    benchmark::{run_targets, BenchmarkConfig},
    cli::{log_messages_from_env, Args, OutputFormat},
    logging,
    targets::{default_targets, select_targets},
    transport::{Connector, NetworkConnector, SimulatedConnector},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();
    let log_messages = log_messages_from_env();

    info!("Starting Load Generation Benchmark");
    info!("Configuration: {:?}", args);

    let config = BenchmarkConfig::from_args(&args, log_messages)?;
    let targets = select_targets(default_targets(), args.protocols.clone());

    let connector: Box<dyn Connector> = if args.simulate {
        info!("Using simulated in-process connections");
        Box::new(SimulatedConnector::new().write_timeout(config.write_timeout))
    } else {
        Box::new(NetworkConnector::new(config.transport_config()))
    };

    let mut results_manager = run_targets(&config, &targets, connector.as_ref()).await?;
    results_manager
        .finalize()
        .context("No target was benchmarked")?;

    match args.format {
        OutputFormat::Text => println!("{}", results_manager.render_text()),
        OutputFormat::Json => println!("{}", results_manager.to_json()?),
    }

    info!("Load Generation Benchmark completed");
    Ok(())
}
