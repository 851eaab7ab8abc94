//! Genius scheduler extender
//!
//! Runs beside the cluster scheduler and answers its filter and prioritize
//! calls from GPU telemetry stored in Prometheus.

use anyhow::{Context, Result};
use genius_lib::{
    health::{components, HealthRegistry},
    observability::{SchedulerMetrics, StructuredLogger},
    ClusterCollector, GeniusPlugin, PrometheusBackend, SCHEDULER_NAME,
};
use genius_scheduler::{api, config::SchedulerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCHEDULER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting genius-scheduler");

    let config = SchedulerConfig::load()?;
    info!(
        prometheus_url = %config.prometheus_url,
        api_port = config.api_port,
        max_score = config.max_score,
        "Scheduler configured"
    );

    let health_registry = HealthRegistry::with_failure_threshold(config.unhealthy_after_failures);
    health_registry.register(components::TELEMETRY).await;
    health_registry.register(components::EXTENDER).await;

    // Register metrics before the first scrape
    SchedulerMetrics::new();

    let logger = StructuredLogger::new(SCHEDULER_NAME);
    logger.log_startup(SCHEDULER_VERSION, &config.prometheus_url);

    let backend = PrometheusBackend::new(&config.prometheus_url, config.query_timeout())
        .context("Failed to create Prometheus backend")?;
    let collector = ClusterCollector::new(Arc::new(backend), config.telemetry());
    let plugin = GeniusPlugin::new(collector, config.weights.clone(), config.max_score);

    let app_state = Arc::new(api::AppState::new(plugin, health_registry.clone()));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    return Err(e);
                }
                Err(e) => return Err(e).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
