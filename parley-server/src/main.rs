use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use parley_core::logging::{init_logging_with_config, LogConfig};
use parley_core::metrics::init_metrics;
use parley_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use parley_core::Config;
use parley_server::{build_hub, ParleyServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(author, version, about = "Real-time chat relay", long_about = None)]
struct Args {
    /// TOML configuration file; PARLEY_* environment variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;
    info!("Parley server starting");

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics.bind_address)
            .install()?;
        init_metrics();
        info!("Prometheus exporter on {}", config.metrics.bind_address);
    }

    let hub = build_hub(&config.store)?;

    let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
    install_signal_handlers(shutdown.clone());

    ParleyServer::new(hub, config, shutdown).run().await?;

    info!("Parley server stopped");
    Ok(())
}
