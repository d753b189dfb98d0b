//! Failover Controller - Active Source State Machine
//!
//! Single owner of the authoritative `active` source. Consumes the merged
//! event stream from both feed connections and the watchdog, applies the
//! transitions below, and publishes the de-duplicated quote stream:
//!
//! 1. Primary quote: refresh liveness; recover to Primary if needed
//!    (stopping Secondary); emit.
//! 2. Secondary quote: emit only while Secondary is active.
//! 3. Primary disconnect / connect failure: degrade to Secondary.
//! 4. Stale check: degrade to Secondary when Primary has been idle
//!    longer than the stale timeout.
//! 5. Secondary lifecycle events: report only, never flip.
//!
//! Every flip checks the current state first, so repeated triggers are
//! no-ops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::FailoverConfig;
use crate::domain::error::InvariantViolation;
use crate::domain::events::{ChangeReason, FailoverEvent, FeedEvent, FeedStatus, SourceChange};
use crate::domain::quote::{NormalizedQuote, Source};
use crate::ports::feed_control::FeedControl;
use crate::ports::output_sink::OutputSink;

/// Counters kept by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
  /// Quotes passed to `on_active_quote`.
  pub quotes_emitted: u64,
  /// Secondary quotes dropped while Primary was active.
  pub quotes_suppressed: u64,
  /// Active source flips.
  pub source_changes: u64,
}

/// Owns the active-source state and drives both feed connections.
pub struct FailoverController {
  active: Source,
  primary_last_tick_at: Option<Instant>,
  stale_timeout: Duration,
  primary: Arc<dyn FeedControl>,
  secondary: Arc<dyn FeedControl>,
  sink: Arc<dyn OutputSink>,
  active_tx: watch::Sender<Source>,
  stats: ControllerStats,
}

impl FailoverController {
  /// Create a controller with Primary active.
  pub fn new(
    config: &FailoverConfig,
    primary: Arc<dyn FeedControl>,
    secondary: Arc<dyn FeedControl>,
    sink: Arc<dyn OutputSink>,
  ) -> Self {
    let (active_tx, _) = watch::channel(Source::Primary);
    Self {
      active: Source::Primary,
      primary_last_tick_at: None,
      stale_timeout: config.stale_timeout(),
      primary,
      secondary,
      sink,
      active_tx,
      stats: ControllerStats::default(),
    }
  }

  /// Currently authoritative source.
  pub fn active_source(&self) -> Source {
    self.active
  }

  /// Last Primary quote receipt instant.
  pub fn primary_last_tick_at(&self) -> Option<Instant> {
    self.primary_last_tick_at
  }

  pub fn stats(&self) -> ControllerStats {
    self.stats
  }

  /// Read-only view of the active source for health reporting.
  pub fn subscribe_active(&self) -> watch::Receiver<Source> {
    self.active_tx.subscribe()
  }

  /// Start the Primary connection. Secondary stays idle until needed.
  pub fn bootstrap(&mut self) {
    info!(active = %self.active, "Failover controller starting primary feed");
    self.active_tx.send_replace(self.active);
    self.primary.start();
  }

  /// Apply one event. Never fails; defects are reported as invariant
  /// violations.
  pub fn handle(&mut self, event: FailoverEvent) {
    match event {
      FailoverEvent::Feed { source, event } => match event {
        FeedEvent::QuoteReceived(quote) => self.on_quote(source, quote),
        FeedEvent::Connected => {
          info!(source = %source, "Feed connected");
          self.sink.on_feed_status(source, FeedStatus::Open);
        }
        FeedEvent::Disconnected { reason } => {
          warn!(source = %source, reason = %reason, "Feed disconnected");
          self.sink.on_feed_status(source, FeedStatus::Closed);
          if source == Source::Primary {
            self.degrade(ChangeReason::Degraded, None);
          }
        }
        FeedEvent::ConnectFailed { reason } => {
          warn!(source = %source, reason = %reason, "Feed connect failed");
          self.sink.on_feed_status(source, FeedStatus::Closed);
          if source == Source::Primary {
            self.degrade(ChangeReason::Degraded, None);
          }
        }
      },
      FailoverEvent::StaleCheck { at } => self.on_stale_check(at),
    }
  }

  /// Consume events until shutdown or until every sender is gone.
  ///
  /// Shutdown is checked first on every iteration, so nothing queued
  /// behind it is processed. Both connections are stopped on exit.
  #[instrument(skip_all, name = "failover_loop")]
  pub async fn run(
    mut self,
    mut events: mpsc::UnboundedReceiver<FailoverEvent>,
    shutdown: CancellationToken,
  ) -> ControllerStats {
    loop {
      tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
          info!("Shutdown signal received in failover controller");
          break;
        }
        event = events.recv() => match event {
          Some(event) => self.handle(event),
          None => {
            info!("Failover event channel closed");
            break;
          }
        }
      }
    }

    events.close();
    for source in [Source::Primary, Source::Secondary] {
      self.feed(source).stop();
      self.sink.on_feed_status(source, FeedStatus::Closed);
    }

    info!(
      emitted = self.stats.quotes_emitted,
      suppressed = self.stats.quotes_suppressed,
      source_changes = self.stats.source_changes,
      "Failover controller stopped"
    );
    self.stats
  }

  fn on_quote(&mut self, source: Source, quote: NormalizedQuote) {
    if quote.source != source {
      self.violation(InvariantViolation(format!(
        "quote tagged {} delivered on {} channel",
        quote.source, source
      )));
      return;
    }

    match source {
      Source::Primary => {
        self.primary_last_tick_at = Some(quote.observed_at);
        if self.active == Source::Secondary {
          self.recover();
        }
        self.emit(&quote);
      }
      Source::Secondary => {
        if self.active == Source::Secondary {
          self.emit(&quote);
        } else {
          self.stats.quotes_suppressed += 1;
        }
      }
    }
  }

  fn on_stale_check(&mut self, at: Instant) {
    if self.active != Source::Primary {
      return;
    }

    let idle = self
      .primary_last_tick_at
      .map(|t| at.saturating_duration_since(t));

    let stale = match idle {
      Some(idle) => idle > self.stale_timeout,
      None => true,
    };

    if stale {
      debug!(idle_ms = idle.map(|d| d.as_millis() as u64), "Primary stale");
      self.degrade(ChangeReason::StaleTimeout, idle);
    }
  }

  fn feed(&self, source: Source) -> &Arc<dyn FeedControl> {
    match source {
      Source::Primary => &self.primary,
      Source::Secondary => &self.secondary,
    }
  }

  /// Flip to Secondary and start it. No-op if already there.
  fn degrade(&mut self, reason: ChangeReason, idle: Option<Duration>) {
    if self.active == Source::Secondary {
      return;
    }
    self.flip(reason, idle);
    self.secondary.start();
  }

  /// Flip back to Primary and stop Secondary. No-op if already there.
  fn recover(&mut self) {
    if self.active == Source::Primary {
      return;
    }
    self.flip(ChangeReason::Recovered, None);
    self.secondary.stop();
    // A stopped connection emits nothing further; report it closed here.
    self.sink.on_feed_status(Source::Secondary, FeedStatus::Closed);
  }

  fn flip(&mut self, reason: ChangeReason, idle: Option<Duration>) {
    let next = self.active.other();
    let change = SourceChange {
      active: next,
      previous: self.active,
      reason,
      idle,
    };
    self.active = next;
    self.stats.source_changes += 1;
    self.active_tx.send_replace(next);

    info!(
      active = %next,
      previous = %change.previous,
      reason = reason.as_str(),
      "Active source changed"
    );
    self.sink.on_source_changed(&change);
  }

  fn emit(&mut self, quote: &NormalizedQuote) {
    if quote.source != self.active {
      self.violation(InvariantViolation(format!(
        "attempted to emit {} quote while {} is active",
        quote.source, self.active
      )));
      return;
    }
    self.stats.quotes_emitted += 1;
    self.sink.on_active_quote(quote);
  }

  fn violation(&self, v: InvariantViolation) {
    error!(error = %v, "Failover invariant violated");
    debug_assert!(false, "{v}");
  }
}
