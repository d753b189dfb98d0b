//! Prometheus Metrics Registry - Failover Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Covers the active quote stream, source flips, and feed
//! health.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::domain::events::{FeedStatus, SourceChange};
use crate::domain::quote::{NormalizedQuote, Source};

/// Centralized Prometheus metrics for the failover service.
///
/// All metrics follow the naming convention `quote_failover_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Quotes published on the active stream.
    pub active_quotes: IntCounterVec,
    /// Last published mid price per instrument.
    pub last_mid: GaugeVec,
    /// Active-source flips by reason.
    pub source_changes: IntCounterVec,
    /// Active source (0 = primary, 1 = secondary).
    pub active_source: IntGauge,
    /// Feed connection status (1 = connected, 0 = disconnected).
    pub feed_connected: GaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let active_quotes = IntCounterVec::new(
            Opts::new(
                "quote_failover_active_quotes_total",
                "Quotes published from the active source",
            ),
            &["source", "instrument"],
        )?;

        let last_mid = GaugeVec::new(
            Opts::new(
                "quote_failover_last_mid",
                "Mid price of the last published quote",
            ),
            &["instrument"],
        )?;

        let source_changes = IntCounterVec::new(
            Opts::new(
                "quote_failover_source_changes_total",
                "Active source flips",
            ),
            &["active", "reason"],
        )?;

        let active_source = IntGauge::new(
            "quote_failover_active_source",
            "Active source (0=primary, 1=secondary)",
        )?;

        let feed_connected = GaugeVec::new(
            Opts::new(
                "quote_failover_feed_connected",
                "Feed connection status (1=connected, 0=disconnected)",
            ),
            &["source"],
        )?;

        registry.register(Box::new(active_quotes.clone()))?;
        registry.register(Box::new(last_mid.clone()))?;
        registry.register(Box::new(source_changes.clone()))?;
        registry.register(Box::new(active_source.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;

        Ok(Self {
            registry,
            active_quotes,
            last_mid,
            source_changes,
            active_source,
            feed_connected,
        })
    }

    pub fn record_quote(&self, quote: &NormalizedQuote) {
        self.active_quotes
            .with_label_values(&[quote.source.as_str(), quote.instrument.as_str()])
            .inc();
        self.last_mid
            .with_label_values(&[quote.instrument.as_str()])
            .set(quote.mid());
    }

    pub fn record_source_change(&self, change: &SourceChange) {
        self.source_changes
            .with_label_values(&[change.active.as_str(), change.reason.as_str()])
            .inc();
        self.active_source.set(match change.active {
            Source::Primary => 0,
            Source::Secondary => 1,
        });
    }

    pub fn record_feed_status(&self, source: Source, status: FeedStatus) {
        let connected = if status == FeedStatus::Open { 1.0 } else { 0.0 };
        self.feed_connected
            .with_label_values(&[source.as_str()])
            .set(connected);
    }

    /// Render all metrics in the Prometheus text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.encode() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            error!(error = %e, "Metrics encoding failed");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
