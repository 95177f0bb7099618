#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line host for commute risk aggregation.
//!
//! `run` evaluates a JSON batch of routes, hazard events and forecasts and
//! prints the cycle report; with `--interval-secs` it keeps re-reading the
//! batch and running cycles until interrupted. `decode` prints a route
//! polyline as `GeoJSON`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commute_risk_host::{
    BatchInput, CycleReport, Host, HostConfig, HostError, LogNotifier, preview,
};
use commute_risk_notify::InMemorySchedulingStore;
use commute_risk_polyline::DEFAULT_SAMPLE_INTERVAL_KM;

#[derive(Parser)]
#[command(name = "commute_risk_host", about = "Commute risk aggregation host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run aggregation cycles over a JSON batch file
    Run {
        /// TOML configuration file (defaults to `$COMMUTE_RISK_CONFIG`)
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON batch of routes, events and forecasts
        #[arg(long)]
        input: PathBuf,
        /// Evaluate as of this RFC 3339 instant instead of the clock
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Repeat every N seconds, re-reading the input each time
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Decode a flexible polyline into `GeoJSON`
    Decode {
        polyline: String,
        /// Simplify with this tolerance in km before sampling
        #[arg(long)]
        simplify: Option<f64>,
        /// Waypoint sampling interval in km
        #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_KM)]
        sample: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            input,
            now,
            interval_secs,
        } => {
            let config = HostConfig::load(config.as_deref())?;
            let mut host = Host::new(config, InMemorySchedulingStore::new(), LogNotifier)?;

            let Some(secs) = interval_secs else {
                let batch = BatchInput::from_path(&input)?;
                let report = host.run_cycle(batch, now.unwrap_or_else(Utc::now)).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            };

            log::info!("Running a cycle every {secs}s over {}", input.display());
            let period = std::time::Duration::from_secs(secs.max(1));
            loop {
                match run_once(&mut host, &input).await {
                    Ok(report) => println!("{}", serde_json::to_string(&report)?),
                    Err(e) if e.is_retryable() => log::warn!("Cycle failed, retrying: {e}"),
                    Err(e) => return Err(e.into()),
                }

                tokio::select! {
                    () = tokio::time::sleep(period) => {}
                    result = tokio::signal::ctrl_c() => {
                        result?;
                        log::info!("Interrupted, stopping");
                        return Ok(());
                    }
                }
            }
        }
        Commands::Decode {
            polyline,
            simplify,
            sample,
        } => {
            let collection = preview::route_preview(&polyline, simplify, sample)?;
            println!("{collection}");
        }
    }

    Ok(())
}

async fn run_once(
    host: &mut Host<InMemorySchedulingStore, LogNotifier>,
    input: &Path,
) -> Result<CycleReport, HostError> {
    let batch = BatchInput::from_path(input)?;
    host.run_cycle(batch, Utc::now()).await
}
