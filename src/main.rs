//! dexswap CLI
//!
//! Replays a scenario file against an in-memory exchange and prints the
//! resulting step outcomes, pool reserves and account balances.
//!
//! Usage:
//! ```text
//! dexswap --scenario demos/basic.toml
//! dexswap --config dexswap.toml --scenario demos/basic.toml --json
//! RUST_LOG=dexswap=debug dexswap --scenario demos/basic.toml --now 1700000000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use dexswap::config::{load_config, load_config_from_file};
use dexswap::scenario::{Scenario, ScenarioRunner};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Constant-product exchange scenario runner
#[derive(Parser)]
#[command(name = "dexswap", version)]
struct Args {
    /// Exchange configuration (TOML)
    #[arg(short, long, env = "DEXSWAP_CONFIG")]
    config: Option<PathBuf>,

    /// Scenario to replay (TOML)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Fixed clock in unix seconds (overrides the scenario's `now`)
    #[arg(long)]
    now: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };

    // RUST_LOG wins over the configured level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let scenario = Scenario::load(&args.scenario)?;
    let now = args
        .now
        .or(scenario.now)
        .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);

    info!(
        "Replaying {} ({} steps) at t={} with registry {}",
        args.scenario.display(),
        scenario.steps.len(),
        now,
        config.registry_address
    );

    let mut runner = ScenarioRunner::new(config, &scenario, now)?;
    let outcomes = runner.run(&scenario.steps).await;
    let report = runner.report(outcomes).await;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        println!("{}", report);
    }

    info!("Done: {} steps, {} failed", report.steps.len(), report.failures());
    Ok(())
}
