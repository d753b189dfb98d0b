//! Quote Failover - Entry Point
//!
//! Initializes configuration, logging, both feed adapters and the
//! failover core. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (or the path given as first argument) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create the Prometheus registry and the tracing sink
//! 4. Create BinanceFeed (primary) and PythFeed (secondary)
//! 5. Build the failover supervisor and spawn controller + watchdog
//! 6. Spawn health server (/live + /ready) and metrics server (/metrics)
//! 7. Wait for SIGINT → graceful shutdown (supervisor→tasks→servers)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use quote_failover::adapters::feeds::{BinanceFeed, PythFeed};
use quote_failover::adapters::metrics::{HealthServer, MetricsRegistry};
use quote_failover::adapters::sinks::TracingSink;
use quote_failover::config;
use quote_failover::ports::output_sink::OutputSink;
use quote_failover::usecases::supervisor::FailoverSupervisor;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.service.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        instruments = config.instruments.len(),
        stale_timeout_ms = config.failover.stale_timeout_ms,
        "Starting quote failover service"
    );

    // ── 3. Shutdown channel, metrics and sink ───────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    let metrics = Arc::new(
        MetricsRegistry::new().context("Failed to create metrics registry")?,
    );
    let sink: Arc<dyn OutputSink> = if config.metrics.enabled {
        Arc::new(TracingSink::with_metrics(Arc::clone(&metrics)))
    } else {
        Arc::new(TracingSink::new())
    };

    // ── 4. Create feed adapters ─────────────────────────────
    let primary = Arc::new(BinanceFeed::new(&config.primary, &config.instruments));
    let secondary = Arc::new(
        PythFeed::new(&config.secondary, &config.instruments)
            .context("Failed to create Pyth Hermes client")?,
    );
    info!(primary = %primary.url(), secondary = %secondary.url(), "Feed adapters created");

    // ── 5. Failover core ────────────────────────────────────
    let mut supervisor = FailoverSupervisor::new(
        &config.failover,
        config.quote_validator(),
        primary,
        secondary,
        sink,
    );
    let handles = supervisor
        .spawn()
        .context("Failover supervisor already spawned")?;

    // ── 6. Health and metrics servers ───────────────────────
    let health_server = HealthServer::new(supervisor.health(), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = if config.metrics.enabled {
        let metrics_shutdown = shutdown_tx.subscribe();
        let bind_address = config.metrics.bind_address.clone();
        let metrics_ref = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = metrics_ref.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    info!("All tasks spawned, service is running");

    // ── 7. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    } else {
        info!("SIGINT received, initiating graceful shutdown");
    }

    // 1. Stop the failover core (controller stops both feeds)
    supervisor.shutdown();

    match tokio::time::timeout(Duration::from_secs(5), handles.controller).await {
        Ok(Ok(stats)) => info!(
            emitted = stats.quotes_emitted,
            suppressed = stats.quotes_suppressed,
            source_changes = stats.source_changes,
            "Failover controller finished"
        ),
        Ok(Err(e)) => error!(error = %e, "Failover controller task panicked"),
        Err(_) => warn!("Failover controller did not stop within 5s"),
    }
    let _ = tokio::time::timeout(Duration::from_secs(1), handles.watchdog).await;
    if tokio::time::timeout(Duration::from_secs(3), supervisor.join_feeds())
        .await
        .is_err()
    {
        warn!("Feed connections did not close within 3s");
    }

    // 2. Stop servers
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}
