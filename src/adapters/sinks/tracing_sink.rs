//! Tracing Sink - Structured log of the active quote stream.
//!
//! Writes each published quote and every source flip as a structured
//! `tracing` event, and mirrors them into the Prometheus registry when
//! one is attached.

use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::events::{ChangeReason, FeedStatus, SourceChange};
use crate::domain::quote::{NormalizedQuote, Source};
use crate::ports::output_sink::OutputSink;

/// `OutputSink` that logs through `tracing`.
#[derive(Default)]
pub struct TracingSink {
    metrics: Option<Arc<MetricsRegistry>>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record into the given metrics registry.
    pub fn with_metrics(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }
}

impl OutputSink for TracingSink {
    fn on_active_quote(&self, quote: &NormalizedQuote) {
        info!(
            instrument = %quote.instrument,
            source = %quote.source,
            bid = quote.bid,
            ask = quote.ask,
            mid = quote.mid(),
            spread = quote.spread(),
            observed_at_ms = quote.observed_at_ms,
            published_at_ms = ?quote.published_at_ms,
            "Active quote"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_quote(quote);
        }
    }

    fn on_source_changed(&self, change: &SourceChange) {
        let idle_ms = change.idle.map(|d| d.as_millis() as u64);
        match change.reason {
            ChangeReason::Recovered => info!(
                active = %change.active,
                previous = %change.previous,
                reason = change.reason.as_str(),
                "Primary recovered, switched back"
            ),
            ChangeReason::Degraded | ChangeReason::StaleTimeout => warn!(
                active = %change.active,
                previous = %change.previous,
                reason = change.reason.as_str(),
                idle_ms = ?idle_ms,
                "Failing over to secondary"
            ),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_source_change(change);
        }
    }

    fn on_feed_status(&self, source: Source, status: FeedStatus) {
        if let Some(metrics) = &self.metrics {
            metrics.record_feed_status(source, status);
        }
    }
}
