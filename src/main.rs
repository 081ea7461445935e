// metricsd daemon entry point
// Dispatches to the aggregation server or the reporting agent

use anyhow::Result;
use clap::Parser;
use metricsd::agent::{HttpTransport, Reporter, ReporterConfig, RuntimeSampler};
use metricsd::cli::{self, AgentArgs, Commands, ServerArgs};
use metricsd::config::{self, MetricsdConfig};
use metricsd::persistence::{self, Persister};
use metricsd::server::{self, listener};
use metricsd::signals::{self, ShutdownCoordinator};
use metricsd::{observability, FileStorage, MetricStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            observability::init(args.common.verbose)?;
            run_server(args).await
        }
        Commands::Agent(args) => {
            observability::init(args.common.verbose)?;
            run_agent(args).await
        }
        Commands::Validate { file } => validate_command(&file),
    }
}

/// Run the aggregation server until SIGINT/SIGTERM, then write a final snapshot
async fn run_server(args: ServerArgs) -> Result<()> {
    let mut config = MetricsdConfig::load(&args.common.config)?.server;
    args.apply(&mut config);
    config.apply_env(config::process_env);
    config.validate()?;

    info!(
        address = %config.address,
        store_interval_secs = config.store_interval_secs,
        file_storage_path = %config.file_storage_path,
        restore = config.restore,
        "Server configuration loaded"
    );

    let store = Arc::new(MetricStore::with_file(FileStorage::new(&config.file_storage_path)));
    persistence::restore_on_startup(&store, config.restore);

    let coordinator = ShutdownCoordinator::new();
    let persister = Persister::spawn(store.clone(), config.store_interval(), coordinator.subscribe());

    let addr = listener::resolve(&config.address)?;
    let tcp = listener::create_listener(&addr, &listener::ListenerConfig::default())?;
    let shutdown_signal = signals::create_shutdown_listener()?;
    info!("Signal handlers installed (SIGTERM, SIGINT)");

    cli::success(&format!("Aggregation server listening on http://{}", addr));
    server::serve(tcp, store.clone(), shutdown_signal).await?;

    info!("Shutdown signal received - stopping background tasks");
    coordinator.trigger();
    if let Err(e) = persister.await {
        tracing::error!(error = %e, "Persister task ended abnormally");
    }

    info!("Writing final snapshot");
    persistence::save_now(store).await;

    info!("Aggregation server stopped");
    Ok(())
}

/// Run the reporting agent until SIGINT/SIGTERM
async fn run_agent(args: AgentArgs) -> Result<()> {
    let mut config = MetricsdConfig::load(&args.common.config)?.agent;
    args.apply(&mut config);
    config.apply_env(config::process_env);
    config.validate()?;

    info!(
        address = %config.address,
        poll_interval_secs = config.poll_interval_secs,
        report_interval_secs = config.report_interval_secs,
        request_timeout_ms = config.request_timeout_ms,
        "Agent configuration loaded"
    );

    let transport = Arc::new(HttpTransport::new(&config.address, config.request_timeout())?);
    info!(url = transport.url(), "Reporting to aggregator");

    let reporter = Reporter::new(ReporterConfig::from(&config), transport, RuntimeSampler::new());
    let coordinator = ShutdownCoordinator::new();
    let shutdown_signal = signals::create_shutdown_listener()?;

    let handle = tokio::spawn(reporter.run(coordinator.subscribe()));
    cli::success(&format!("Agent reporting to {}", config.address));

    shutdown_signal.await;
    coordinator.trigger();
    handle.await?;

    Ok(())
}

/// Validate a configuration file and print the effective settings
fn validate_command(file: &str) -> Result<()> {
    let config = MetricsdConfig::load(file)?;
    match config.validate() {
        Ok(()) => {
            cli::success(&format!("{} is valid", file));
            cli::print_config(&config)
        }
        Err(e) => {
            cli::error(&format!("{} is invalid: {}", file, e));
            Err(e)
        }
    }
}
