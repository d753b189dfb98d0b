//! Failover Supervisor - Wiring and Lifecycle for the Failover Core
//!
//! Builds the single serialized event channel, both feed connections,
//! the controller and the watchdog. Spawns them as tokio tasks, provides
//! readiness for the /ready endpoint, and coordinates shutdown.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::FailoverConfig;
use crate::domain::events::{FailoverEvent, FeedStatus};
use crate::domain::quote::{QuoteValidator, Source};
use crate::ports::feed_adapter::FeedAdapter;
use crate::ports::feed_control::FeedControl;
use crate::ports::output_sink::OutputSink;

use super::failover_controller::{ControllerStats, FailoverController};
use super::feed_connection::FeedConnection;
use super::watchdog::Watchdog;

/// Read-only health view shared with the health server.
#[derive(Clone)]
pub struct FailoverHealth {
  active: watch::Receiver<Source>,
  primary: Arc<dyn FeedControl>,
  secondary: Arc<dyn FeedControl>,
  shutdown: CancellationToken,
}

impl FailoverHealth {
  /// Currently authoritative source.
  pub fn active_source(&self) -> Source {
    *self.active.borrow()
  }

  /// Status of one feed connection.
  pub fn feed_status(&self, source: Source) -> FeedStatus {
    match source {
      Source::Primary => self.primary.status(),
      Source::Secondary => self.secondary.status(),
    }
  }

  /// Ready when the active source's connection is open and shutdown
  /// has not begun.
  pub fn is_ready(&self) -> bool {
    !self.shutdown.is_cancelled()
      && self.feed_status(self.active_source()) == FeedStatus::Open
  }

  /// At least one feed is open (degraded mode OK).
  pub fn is_healthy(&self) -> bool {
    self.primary.status() == FeedStatus::Open || self.secondary.status() == FeedStatus::Open
  }
}

/// Supervises the failover core tasks.
pub struct FailoverSupervisor<P: FeedAdapter, S: FeedAdapter> {
  primary: Arc<FeedConnection<P>>,
  secondary: Arc<FeedConnection<S>>,
  controller: Option<(FailoverController, mpsc::UnboundedReceiver<FailoverEvent>)>,
  watchdog: Option<Watchdog>,
  health: FailoverHealth,
  shutdown: CancellationToken,
}

impl<P: FeedAdapter, S: FeedAdapter> FailoverSupervisor<P, S> {
  /// Wire both adapters into connections, controller and watchdog.
  pub fn new(
    config: &FailoverConfig,
    validator: QuoteValidator,
    primary_adapter: Arc<P>,
    secondary_adapter: Arc<S>,
    sink: Arc<dyn OutputSink>,
  ) -> Self {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let validator = Arc::new(validator);
    let policy = config.backoff_policy();
    let shutdown = CancellationToken::new();

    let primary = Arc::new(FeedConnection::new(
      Source::Primary,
      primary_adapter,
      policy,
      Arc::clone(&validator),
      events_tx.clone(),
    ));
    let secondary = Arc::new(FeedConnection::new(
      Source::Secondary,
      secondary_adapter,
      policy,
      validator,
      events_tx.clone(),
    ));

    let controller = FailoverController::new(
      config,
      Arc::clone(&primary) as Arc<dyn FeedControl>,
      Arc::clone(&secondary) as Arc<dyn FeedControl>,
      sink,
    );

    let health = FailoverHealth {
      active: controller.subscribe_active(),
      primary: Arc::clone(&primary) as Arc<dyn FeedControl>,
      secondary: Arc::clone(&secondary) as Arc<dyn FeedControl>,
      shutdown: shutdown.clone(),
    };

    Self {
      primary,
      secondary,
      controller: Some((controller, events_rx)),
      watchdog: Some(Watchdog::new(config.watchdog_interval(), events_tx)),
      health,
      shutdown,
    }
  }

  pub fn primary(&self) -> Arc<FeedConnection<P>> {
    Arc::clone(&self.primary)
  }

  /// Health view for the health server.
  pub fn health(&self) -> FailoverHealth {
    self.health.clone()
  }

  /// Bootstrap the controller and spawn the controller and watchdog
  /// tasks. Returns `None` if already spawned.
  #[instrument(skip(self))]
  pub fn spawn(&mut self) -> Option<SupervisorHandles> {
    let (mut controller, events_rx) = self.controller.take()?;
    let watchdog = self.watchdog.take()?;

    controller.bootstrap();
    let controller = tokio::spawn(controller.run(events_rx, self.shutdown.clone()));
    let watchdog = watchdog.spawn(self.shutdown.clone());

    info!("Failover core tasks spawned");
    Some(SupervisorHandles {
      controller,
      watchdog,
    })
  }

  /// Begin shutdown: the controller stops processing events and stops
  /// both connections; the watchdog exits.
  pub fn shutdown(&self) {
    info!("Failover supervisor shutdown requested");
    self.shutdown.cancel();
  }

  /// Wait for both connections to finish closing their upstreams.
  /// Call after the controller task has exited.
  pub async fn join_feeds(&self) {
    tokio::join!(self.primary.wait_closed(), self.secondary.wait_closed());
  }
}

/// Join handles of the spawned core tasks.
pub struct SupervisorHandles {
  pub controller: JoinHandle<ControllerStats>,
  pub watchdog: JoinHandle<()>,
}
