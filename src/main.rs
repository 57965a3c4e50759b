use std::path::PathBuf;

use clap::Parser;

use topology_proxy::config::{load_config, ProxyConfig};
use topology_proxy::lifecycle::{signals, startup};
use topology_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "topology-proxy")]
#[command(about = "Reverse proxy with a live-reloaded origins topology", long_about = None)]
struct Args {
    /// Process configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Origins definition file, overriding `origins.path`.
    #[arg(short, long)]
    origins: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(origins) = args.origins {
        config.origins.path = origins;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "topology-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origins = %config.origins.path.display(),
        monitor = config.origins.monitor,
        poll_interval_ms = config.origins.poll_interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let handle = startup::start(&config).await?;
    signals::wait_for_termination().await;
    handle.stop().await;

    Ok(())
}
