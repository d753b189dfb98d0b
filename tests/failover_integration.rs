//! Integration Tests - Failover Core End-to-end
//!
//! Tests the interaction between the controller, feed connections,
//! watchdog and supervisor through the public ports. Uses mockall for
//! trait mocking and tokio::test with paused time for async tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::{Sequence, mock};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use quote_failover::adapters::metrics::MetricsRegistry;
use quote_failover::adapters::sinks::TracingSink;
use quote_failover::config::FailoverConfig;
use quote_failover::domain::{
    ChangeReason, CrossedQuotePolicy, FailoverEvent, FeedError, FeedEvent, FeedStatus,
    NormalizedQuote, QuoteValidator, Source, SourceChange,
};
use quote_failover::ports::feed_adapter::{FeedAdapter, RawMessage};
use quote_failover::ports::feed_control::FeedControl;
use quote_failover::ports::output_sink::OutputSink;
use quote_failover::usecases::{FailoverController, FailoverSupervisor};

// ---- Mock Definitions ----

mock! {
    pub Feed {}

    impl FeedControl for Feed {
        fn start(&self);
        fn stop(&self);
        fn status(&self) -> FeedStatus;
    }
}

mock! {
    pub Sink {}

    impl OutputSink for Sink {
        fn on_active_quote(&self, quote: &NormalizedQuote);
        fn on_source_changed(&self, change: &SourceChange);
        fn on_feed_status(&self, source: Source, status: FeedStatus);
    }
}

// ---- Helpers ----

fn quote(source: Source, at: Instant, bid: f64) -> FailoverEvent {
    FailoverEvent::feed(
        source,
        FeedEvent::QuoteReceived(NormalizedQuote {
            instrument: "BTC".to_string(),
            source,
            bid,
            ask: bid + 0.5,
            observed_at: at,
            observed_at_ms: 0,
            published_at_ms: None,
        }),
    )
}

fn disconnected(source: Source) -> FailoverEvent {
    FailoverEvent::feed(
        source,
        FeedEvent::Disconnected {
            reason: "peer closed".to_string(),
        },
    )
}

fn controller(primary: MockFeed, secondary: MockFeed, sink: MockSink) -> FailoverController {
    FailoverController::new(
        &FailoverConfig::default(),
        Arc::new(primary),
        Arc::new(secondary),
        Arc::new(sink),
    )
}

/// Adapter fed from a test-owned channel. `None` simulates a peer close;
/// connecting while the channel is already in use fails.
struct ChannelAdapter {
    slot: Mutex<Option<mpsc::UnboundedReceiver<Option<String>>>>,
}

impl ChannelAdapter {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<Option<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = Arc::new(Self {
            slot: Mutex::new(Some(rx)),
        });
        (adapter, tx)
    }
}

#[async_trait]
impl FeedAdapter for ChannelAdapter {
    type Handle = mpsc::UnboundedReceiver<Option<String>>;

    fn name(&self) -> &'static str {
        "channel"
    }

    async fn connect(&self) -> Result<Self::Handle, FeedError> {
        self.slot
            .lock()
            .take()
            .ok_or_else(|| FeedError::Connect("upstream busy".to_string()))
    }

    async fn receive(&self, handle: &mut Self::Handle) -> Option<Result<String, FeedError>> {
        match handle.recv().await {
            Some(Some(payload)) => Some(Ok(payload)),
            Some(None) | None => None,
        }
    }

    async fn close(&self, handle: Self::Handle) {
        *self.slot.lock() = Some(handle);
    }

    fn parse(&self, source: Source, raw: &RawMessage) -> Result<Vec<NormalizedQuote>, FeedError> {
        let (instrument, px) = raw
            .payload
            .split_once(':')
            .ok_or_else(|| FeedError::Parse(raw.payload.clone()))?;
        let px: f64 = px
            .parse()
            .map_err(|_| FeedError::Parse(raw.payload.clone()))?;
        Ok(vec![NormalizedQuote {
            instrument: instrument.to_string(),
            source,
            bid: px,
            ask: px + 0.5,
            observed_at: raw.observed_at,
            observed_at_ms: raw.observed_at_ms,
            published_at_ms: None,
        }])
    }
}

#[derive(Default)]
struct RecordingSink {
    quotes: Mutex<Vec<NormalizedQuote>>,
    changes: Mutex<Vec<SourceChange>>,
}

impl OutputSink for RecordingSink {
    fn on_active_quote(&self, quote: &NormalizedQuote) {
        self.quotes.lock().push(quote.clone());
    }

    fn on_source_changed(&self, change: &SourceChange) {
        self.changes.lock().push(*change);
    }
}

fn validator() -> QuoteValidator {
    QuoteValidator::new(
        ["BTC".to_string()].into_iter().collect(),
        CrossedQuotePolicy::PassThrough,
    )
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ---- Controller Tests (mocked ports) ----

#[test]
fn test_primary_disconnect_starts_secondary_once() {
    let mut primary = MockFeed::new();
    primary.expect_start().times(1).return_const(());
    primary.expect_stop().never();

    let mut secondary = MockFeed::new();
    secondary.expect_start().times(1).return_const(());
    secondary.expect_stop().never();

    let mut sink = MockSink::new();
    sink.expect_on_feed_status().return_const(());
    sink.expect_on_active_quote().times(1).return_const(());
    sink.expect_on_source_changed()
        .withf(|c| {
            c.active == Source::Secondary
                && c.previous == Source::Primary
                && c.reason == ChangeReason::Degraded
        })
        .times(1)
        .return_const(());

    let mut controller = controller(primary, secondary, sink);
    let t0 = Instant::now();

    controller.bootstrap();
    controller.handle(quote(Source::Primary, t0, 100.0));
    controller.handle(disconnected(Source::Primary));
    controller.handle(disconnected(Source::Primary));
    controller.handle(FailoverEvent::feed(
        Source::Primary,
        FeedEvent::ConnectFailed {
            reason: "refused".to_string(),
        },
    ));

    assert_eq!(controller.active_source(), Source::Secondary);
    assert_eq!(controller.stats().source_changes, 1);
}

#[test]
fn test_recovery_sequence_is_ordered() {
    let mut seq = Sequence::new();

    let mut primary = MockFeed::new();
    primary.expect_start().never();

    let mut secondary = MockFeed::new();
    secondary
        .expect_start()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let mut sink = MockSink::new();
    sink.expect_on_feed_status().return_const(());
    sink.expect_on_source_changed()
        .withf(|c| c.reason == ChangeReason::StaleTimeout)
        .times(1)
        .return_const(());
    sink.expect_on_active_quote()
        .withf(|q| q.source == Source::Secondary && q.bid == 99.0)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    sink.expect_on_source_changed()
        .withf(|c| c.reason == ChangeReason::Recovered && c.active == Source::Primary)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    secondary
        .expect_stop()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    sink.expect_on_active_quote()
        .withf(|q| q.source == Source::Primary && q.bid == 101.0)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let mut controller = controller(primary, secondary, sink);
    let t0 = Instant::now();

    // Never-ticked primary is stale on the first check.
    controller.handle(FailoverEvent::StaleCheck {
        at: t0 + Duration::from_millis(1_000),
    });
    controller.handle(quote(Source::Secondary, t0 + Duration::from_millis(1_100), 99.0));
    controller.handle(quote(Source::Primary, t0 + Duration::from_millis(1_200), 101.0));

    assert_eq!(controller.active_source(), Source::Primary);
    assert_eq!(controller.primary_last_tick_at(), Some(t0 + Duration::from_millis(1_200)));
}

#[test]
fn test_secondary_lifecycle_only_reaches_status_hook() {
    let mut primary = MockFeed::new();
    primary.expect_start().never();
    let mut secondary = MockFeed::new();
    secondary.expect_start().never();
    secondary.expect_stop().never();

    let mut sink = MockSink::new();
    sink.expect_on_source_changed().never();
    sink.expect_on_active_quote().never();
    sink.expect_on_feed_status()
        .withf(|s, _| *s == Source::Secondary)
        .times(3)
        .return_const(());

    let mut controller = controller(primary, secondary, sink);

    controller.handle(FailoverEvent::feed(Source::Secondary, FeedEvent::Connected));
    controller.handle(disconnected(Source::Secondary));
    controller.handle(FailoverEvent::feed(
        Source::Secondary,
        FeedEvent::ConnectFailed {
            reason: "timeout".to_string(),
        },
    ));
    controller.handle(quote(Source::Secondary, Instant::now(), 99.0));

    assert_eq!(controller.active_source(), Source::Primary);
    assert_eq!(controller.stats().quotes_suppressed, 1);
}

#[tokio::test]
async fn test_run_stops_both_feeds_when_channel_closes() {
    let mut primary = MockFeed::new();
    primary.expect_stop().times(1).return_const(());
    let mut secondary = MockFeed::new();
    secondary.expect_stop().times(1).return_const(());
    let mut sink = MockSink::new();
    sink.expect_on_active_quote().times(2).return_const(());
    sink.expect_on_feed_status()
        .withf(|_, status| *status == FeedStatus::Closed)
        .times(2)
        .return_const(());

    let controller = controller(primary, secondary, sink);
    let (tx, rx) = mpsc::unbounded_channel();
    let t0 = Instant::now();
    tx.send(quote(Source::Primary, t0, 100.0)).unwrap();
    tx.send(quote(Source::Primary, t0, 100.5)).unwrap();
    drop(tx);

    let stats = controller.run(rx, CancellationToken::new()).await;
    assert_eq!(stats.quotes_emitted, 2);
}

// ---- Supervisor End-to-end (paused time) ----

#[tokio::test(start_paused = true)]
async fn test_supervisor_fails_over_and_recovers() {
    let (primary, primary_tx) = ChannelAdapter::new();
    let (secondary, secondary_tx) = ChannelAdapter::new();
    let sink = Arc::new(RecordingSink::default());

    let mut supervisor = FailoverSupervisor::new(
        &FailoverConfig::default(),
        validator(),
        primary,
        secondary,
        Arc::clone(&sink) as Arc<dyn OutputSink>,
    );
    let health = supervisor.health();
    let handles = supervisor.spawn().expect("first spawn");
    assert!(supervisor.spawn().is_none());

    settle().await;
    assert_eq!(health.feed_status(Source::Primary), FeedStatus::Open);
    assert_eq!(health.feed_status(Source::Secondary), FeedStatus::Idle);
    assert!(health.is_ready());

    primary_tx.send(Some("BTC:100".to_string())).unwrap();
    settle().await;

    // Peer closes the primary: failover is immediate.
    primary_tx.send(None).unwrap();
    settle().await;
    assert_eq!(health.active_source(), Source::Secondary);
    assert_eq!(health.feed_status(Source::Secondary), FeedStatus::Open);

    secondary_tx.send(Some("BTC:99".to_string())).unwrap();
    secondary_tx.send(Some("DOGE:1".to_string())).unwrap();
    settle().await;

    // Primary reconnects after the first 1s backoff.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    settle().await;
    assert_eq!(health.feed_status(Source::Primary), FeedStatus::Open);
    assert_eq!(supervisor.primary().backoff_attempt(), 0);

    primary_tx.send(Some("BTC:101".to_string())).unwrap();
    settle().await;
    assert_eq!(health.active_source(), Source::Primary);
    assert_eq!(health.feed_status(Source::Secondary), FeedStatus::Closed);

    let sources: Vec<Source> = sink.quotes.lock().iter().map(|q| q.source).collect();
    assert_eq!(sources, vec![Source::Primary, Source::Secondary, Source::Primary]);

    let reasons: Vec<ChangeReason> = sink.changes.lock().iter().map(|c| c.reason).collect();
    assert_eq!(reasons, vec![ChangeReason::Degraded, ChangeReason::Recovered]);

    supervisor.shutdown();
    let stats = handles.controller.await.unwrap();
    handles.watchdog.await.unwrap();
    assert_eq!(stats.source_changes, 2);
    assert!(!health.is_ready());

    tokio::time::timeout(Duration::from_secs(1), supervisor.join_feeds())
        .await
        .expect("feed sessions close after shutdown");
    assert_eq!(health.feed_status(Source::Primary), FeedStatus::Closed);
    assert!(!health.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_connected_gauges_drop_after_recovery_and_shutdown() {
    let (primary, primary_tx) = ChannelAdapter::new();
    let (secondary, _secondary_tx) = ChannelAdapter::new();
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let sink = Arc::new(TracingSink::with_metrics(Arc::clone(&metrics)));

    let mut supervisor = FailoverSupervisor::new(
        &FailoverConfig::default(),
        validator(),
        primary,
        secondary,
        sink as Arc<dyn OutputSink>,
    );
    let health = supervisor.health();
    let handles = supervisor.spawn().expect("first spawn");
    let connected = |source: &str| metrics.feed_connected.with_label_values(&[source]).get();

    settle().await;
    assert!(health.is_healthy());
    primary_tx.send(Some("BTC:100".to_string())).unwrap();
    primary_tx.send(None).unwrap();
    settle().await;
    assert_eq!(health.active_source(), Source::Secondary);
    assert_eq!(connected("secondary"), 1.0);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    settle().await;
    primary_tx.send(Some("BTC:101".to_string())).unwrap();
    settle().await;
    assert_eq!(health.active_source(), Source::Primary);
    assert_eq!(connected("primary"), 1.0);
    assert_eq!(connected("secondary"), 0.0);

    supervisor.shutdown();
    handles.controller.await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), supervisor.join_feeds())
        .await
        .expect("feed sessions close after shutdown");
    assert_eq!(connected("primary"), 0.0);
    assert_eq!(connected("secondary"), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_fails_over_on_silent_primary() {
    let (primary, primary_tx) = ChannelAdapter::new();
    let (secondary, secondary_tx) = ChannelAdapter::new();
    let sink = Arc::new(RecordingSink::default());

    let mut supervisor = FailoverSupervisor::new(
        &FailoverConfig::default(),
        validator(),
        primary,
        secondary,
        Arc::clone(&sink) as Arc<dyn OutputSink>,
    );
    let health = supervisor.health();
    let handles = supervisor.spawn().expect("first spawn");
    settle().await;

    primary_tx.send(Some("BTC:100".to_string())).unwrap();
    settle().await;

    // Connection stays open but goes quiet; idle must exceed 5s.
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    settle().await;
    assert_eq!(health.active_source(), Source::Primary);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    settle().await;
    assert_eq!(health.active_source(), Source::Secondary);
    assert_eq!(health.feed_status(Source::Primary), FeedStatus::Open);

    secondary_tx.send(Some("BTC:98".to_string())).unwrap();
    settle().await;

    let changes = sink.changes.lock().clone();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].reason, ChangeReason::StaleTimeout);
    assert_eq!(changes[0].idle, Some(Duration::from_millis(6_000)));
    assert_eq!(sink.quotes.lock().last().map(|q| q.source), Some(Source::Secondary));

    supervisor.shutdown();
    handles.controller.await.unwrap();
}
