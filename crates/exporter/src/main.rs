//! VMware Guest Exporter - Prometheus exporter for vmGuestLib statistics
//!
//! Runs inside a VMware guest and publishes the host-side view of the VM's
//! memory, CPU, ballooning and stolen time on a pull endpoint.

use anyhow::Result;
use clap::Parser;
use exporter_lib::{
    ExporterMetrics, GuestCollector, HealthRegistry, MetricTable, StructuredLogger,
};
use prometheus::Registry;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vmwareguest_exporter::{
    api,
    config::{Cli, ExporterConfig},
};

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = ExporterConfig::load(&cli)?;
    let bind_address = config.bind_address()?;
    info!(
        listen_address = %bind_address,
        telemetry_path = %config.telemetry_path,
        "Exporter configured"
    );

    let logger = StructuredLogger::new(&bind_address);

    let registry = Registry::new();
    let metrics = ExporterMetrics::register(&registry)?;
    metrics.set_build_info(EXPORTER_VERSION);

    // Collector stays registered without a session so isguest 0 is served
    let (collector, session_error) =
        GuestCollector::open(MetricTable::vmware_guest(), config.guestlib_path.as_deref())?;

    let health_registry = HealthRegistry::new();
    match &session_error {
        Some(e) => {
            logger.log_session_unavailable(e, e.is_not_a_guest());
            health_registry.record_guest_session(Some(e)).await;
        }
        None => health_registry.record_guest_session(None).await,
    }

    let is_guest = collector.is_guest();
    let collector = collector
        .with_policy(config.refresh_failure)
        .with_logger(logger.clone())
        .with_metrics(metrics);
    registry.register(Box::new(collector))?;

    let app_state = Arc::new(api::AppState::new(
        registry,
        health_registry,
        config.telemetry_path.clone(),
    ));

    logger.log_startup(EXPORTER_VERSION, &config.telemetry_path, is_guest);

    let shutdown_logger = logger.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        shutdown_logger.log_shutdown("SIGINT received");
    };

    api::serve(&bind_address, app_state, shutdown).await?;
    info!("Shutting down");

    Ok(())
}
