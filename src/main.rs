use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use records::{
    collector::{spawn_health_reporter, Scheduler, SchedulerSettings, ServiceRegistry},
    config::Config,
    forwarder,
    sources::WorkerTable,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "records")]
#[command(version)]
#[command(about = "Periodic data collection services with a management API")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("records={},tower_http=trace", cli.log_level)
    } else {
        format!("records={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting records v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(Path::new(&cli.config))?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    let config = Arc::new(config);

    let registry = ServiceRegistry::new();
    let scheduler = Scheduler::new(
        registry.clone(),
        forwarder::from_config(&config.sink),
        SchedulerSettings::from_config(&config),
    );

    let workers = WorkerTable::from_config(&config.workers);
    info!("Registered workers: {:?}", workers.names());

    for spec in &config.services {
        let worker = match workers.resolve(&spec.name) {
            Ok(worker) => worker,
            Err(e) => {
                warn!("Skipping configured service: {}", e);
                continue;
            }
        };

        match scheduler.start(spec.clone(), worker).await {
            Ok(running) => info!("Started service '{}' ({})", spec.name, running.id),
            Err(e) => error!("Failed to start service: {}", e),
        }
    }

    let shutdown = CancellationToken::new();
    spawn_health_reporter(
        registry.clone(),
        Duration::from_secs(config.scheduler.health_report_secs),
        shutdown.clone(),
    );

    {
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            let cancelled = registry.cancel_all().await;
            info!("Shutdown requested, cancelled {} service(s)", cancelled);
            shutdown.cancel();
        });
    }

    let web_server = WebServer::new(AppState::new(scheduler, workers, config.clone()))?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve(shutdown).await?;

    // give cancelled services a moment to deregister
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !registry.is_empty().await && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}
