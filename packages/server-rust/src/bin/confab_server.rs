//! Confab config server.
//!
//! Serves config subscriptions over HTTP long polls, with an admin endpoint
//! for deployments and optional Prometheus metrics.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use confab_server::network::{NetworkConfig, ServerModule};
use confab_server::service::{
    ActivationRunnable, ActivationSender, BackgroundWorker, ServiceConfig,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "confab-server")]
#[command(about = "Serve config subscriptions over HTTP long polls")]
struct Args {
    /// Bind address for the HTTP listener
    #[arg(long, default_value = "0.0.0.0", env = "CONFAB_HOST")]
    host: String,

    /// Port to listen on (0 picks an ephemeral port)
    #[arg(long, default_value_t = 19_071, env = "CONFAB_PORT")]
    port: u16,

    /// Upper bound on a long poll's budget, in milliseconds
    #[arg(long, default_value_t = 60_000)]
    max_timeout_ms: u64,

    /// Interval between expiry sweeps over parked polls, in milliseconds
    #[arg(long, default_value_t = 250)]
    sweep_interval_ms: u64,

    /// Prometheus scrape address, e.g. 0.0.0.0:9464 (disabled when absent)
    #[arg(long, env = "CONFAB_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "Prometheus exporter listening");
    }

    let network = NetworkConfig {
        host: args.host,
        port: args.port,
        ..NetworkConfig::default()
    };
    let service_config = ServiceConfig {
        max_timeout_ms: args.max_timeout_ms,
        sweep_interval_ms: args.sweep_interval_ms,
    };
    let sweep_interval_ms = service_config.sweep_interval_ms;

    let mut module = ServerModule::new(network, service_config);
    let port = module.start().await?;
    info!(port, "Config server starting");

    let service = module.service();
    let store = module.store();
    let shutdown = module.shutdown_controller();

    let mut worker = BackgroundWorker::start(
        ActivationRunnable::new(Arc::clone(&service), Arc::clone(&shutdown)),
        sweep_interval_ms,
    );
    let handle = worker.handle().expect("worker was just started");
    store.add_listener(Arc::new(ActivationSender::new(handle)));

    module
        .serve(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await?;

    worker.stop().await;
    info!("Config server stopped");
    Ok(())
}
