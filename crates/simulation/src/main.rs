use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use hopsim_server::config::NodeConfig;
use hopsim_simulation::{Scenario, run_scenario};

/// Start a scenario's nodes in one process and fire its root requests.
#[derive(Parser, Debug)]
#[command(name = "hopsim-sim", about = "Run a hopsim scenario in-process")]
struct Cli {
    /// Scenario JSON file.
    scenario: PathBuf,

    /// Node configuration applied to every simulated node.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "HOPSIM_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(hopsim_server::telemetry::env_filter(&cli.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let base = match &cli.config {
        Some(path) => NodeConfig::load(path)?.0,
        None => NodeConfig::default(),
    };
    let scenario = Scenario::load(&cli.scenario)?;

    let report = run_scenario(scenario, &base).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
