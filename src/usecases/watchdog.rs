//! Watchdog - Periodic Primary Liveness Check
//!
//! Feeds `StaleCheck` ticks into the controller's event stream. The
//! staleness decision itself lives in the controller; the watchdog only
//! keeps time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::domain::events::FailoverEvent;

/// Periodic stale-check timer.
pub struct Watchdog {
  interval: Duration,
  events: mpsc::UnboundedSender<FailoverEvent>,
}

impl Watchdog {
  pub fn new(interval: Duration, events: mpsc::UnboundedSender<FailoverEvent>) -> Self {
    Self { interval, events }
  }

  /// Spawn the timer on the current runtime.
  pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(self.run(shutdown))
  }

  /// Tick every `interval` (first tick one interval after start) until
  /// shutdown or until the controller goes away.
  #[instrument(skip_all, name = "watchdog", fields(interval_ms = self.interval.as_millis() as u64))]
  pub async fn run(self, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Watchdog started");

    loop {
      tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
          info!("Watchdog cancelled");
          return;
        }
        at = ticker.tick() => {
          if self.events.send(FailoverEvent::StaleCheck { at }).is_err() {
            debug!("Controller gone, watchdog exiting");
            return;
          }
        }
      }
    }
  }
}
