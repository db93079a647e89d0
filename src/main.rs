//! FAssets orchestrator - mint and redeem FXRP from the command line

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use fassets_orchestrator::cli::{self, Cli};
use fassets_orchestrator::config::{LoggingConfig, Settings};
use fassets_orchestrator::metrics::MetricsServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path.clone())?,
        None => Settings::load()?,
    };
    if cli.execute {
        settings.minting.dry_run = false;
    }

    // Initialize logging
    init_logging(&settings.logging);

    info!("Starting FAssets orchestrator v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Chain {} via {} RPC endpoints, dry run {}",
        settings.network.chain_id,
        settings.network.rpc_urls.len(),
        settings.minting.dry_run
    );

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled && cli.command.is_long_running() {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let result = cli::run(cli.command, settings).await;

    if let Some(h) = metrics_handle {
        h.abort();
    }
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn,hyper=warn", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
