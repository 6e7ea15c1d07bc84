use std::sync::Arc;

use clap::Parser;
use tracing::info;

use hopsim_server::config::{NodeConfig, Overrides};

/// One simulated service node.
#[derive(Parser, Debug)]
#[command(name = "hopsim-node", about = "Simulated service node for hopsim request trees")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "hopsim.toml")]
    config: String,

    /// Override the node name.
    #[arg(long, env = "HOPSIM_NODE_NAME")]
    name: Option<String>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long, env = "HOPSIM_PORT")]
    port: Option<u16>,

    /// Override the log level used when `RUST_LOG` is unset.
    #[arg(long, env = "HOPSIM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Disable OpenTelemetry export regardless of the config file.
    #[arg(long, env = "HOPSIM_TELEMETRY_DISABLED")]
    no_telemetry: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, found) = NodeConfig::load(&cli.config)?;
    let config = config.with_overrides(Overrides {
        name: cli.name,
        host: cli.host,
        port: cli.port,
        log_level: cli.log_level,
        no_telemetry: cli.no_telemetry,
    });
    config.validate()?;

    let telemetry_guard = hopsim_server::telemetry::init(&config);

    if !found {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let directory = Arc::new(config.directory());
    let state = hopsim_server::runtime::build_state(&config, directory)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        node = %config.node.name,
        address = %addr,
        peers = config.topology.nodes.len(),
        "hopsim-node listening"
    );

    hopsim_server::runtime::serve(listener, state, shutdown_signal(), config.shutdown_timeout())
        .await?;

    telemetry_guard.shutdown();

    info!(node = %config.node.name, "hopsim-node shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
