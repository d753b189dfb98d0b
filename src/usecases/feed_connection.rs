//! Feed Connection - Lifecycle and Reconnect Backoff for One Source
//!
//! Drives a `FeedAdapter` through connect → stream → close cycles on its
//! own tokio task, retrying with exponential backoff until stopped.
//! Every event goes into the controller's channel; the connection never
//! touches controller state.
//!
//! Sessions are numbered. Status updates and event emission happen under
//! the state lock and only for the current session, so once `stop()`
//! returns no event from the stopped session can be delivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::backoff::BackoffPolicy;
use crate::domain::events::{FailoverEvent, FeedEvent, FeedStatus};
use crate::domain::quote::{QuoteValidator, Source};
use crate::ports::feed_adapter::{FeedAdapter, RawMessage};
use crate::ports::feed_control::FeedControl;

/// Handle to the currently running session task.
struct Session {
  generation: u64,
  token: CancellationToken,
  /// Cuts a pending backoff wait short.
  retry_now: Arc<Notify>,
}

struct ConnState {
  status: FeedStatus,
  session: Option<Session>,
  /// Generation of the session being torn down by `stop()`.
  closing: Option<u64>,
  /// Task of the most recent session; a new session waits for it.
  task: Option<JoinHandle<()>>,
  next_generation: u64,
  last_tick_at: Option<Instant>,
}

struct Inner<A: FeedAdapter> {
  source: Source,
  adapter: Arc<A>,
  policy: BackoffPolicy,
  validator: Arc<QuoteValidator>,
  events: mpsc::UnboundedSender<FailoverEvent>,
  state: Mutex<ConnState>,
  backoff_attempt: AtomicU32,
}

/// How a streaming phase ended.
enum StreamEnd {
  Cancelled,
  Closed(String),
}

/// One upstream connection with automatic reconnect.
pub struct FeedConnection<A: FeedAdapter> {
  inner: Arc<Inner<A>>,
}

impl<A: FeedAdapter> FeedConnection<A> {
  /// Create an idle connection. Nothing happens until `start()`.
  pub fn new(
    source: Source,
    adapter: Arc<A>,
    policy: BackoffPolicy,
    validator: Arc<QuoteValidator>,
    events: mpsc::UnboundedSender<FailoverEvent>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        source,
        adapter,
        policy,
        validator,
        events,
        state: Mutex::new(ConnState {
          status: FeedStatus::Idle,
          session: None,
          closing: None,
          task: None,
          next_generation: 0,
          last_tick_at: None,
        }),
        backoff_attempt: AtomicU32::new(0),
      }),
    }
  }

  /// Consecutive failures since the last successful open.
  pub fn backoff_attempt(&self) -> u32 {
    self.inner.backoff_attempt.load(Ordering::Relaxed)
  }

  /// Instant of the last accepted quote.
  pub fn last_tick_at(&self) -> Option<Instant> {
    self.inner.state.lock().last_tick_at
  }

  /// Wait for the session task to finish its teardown. Meant for
  /// shutdown, after `stop()`; a live session never finishes.
  pub async fn wait_closed(&self) {
    let task = self.inner.state.lock().task.take();
    if let Some(task) = task {
      if let Err(e) = task.await {
        warn!(source = %self.inner.source, error = %e, "Feed session task failed");
      }
    }
  }
}

impl<A: FeedAdapter> FeedControl for FeedConnection<A> {
  fn start(&self) {
    let mut st = self.inner.state.lock();

    if let Some(session) = &st.session {
      if st.status == FeedStatus::Closed {
        // Waiting out a backoff delay: reconnect now instead.
        debug!(source = %self.inner.source, "Start requested during backoff, retrying now");
        session.retry_now.notify_one();
      }
      return;
    }

    let generation = st.next_generation;
    st.next_generation += 1;
    st.status = FeedStatus::Connecting;

    let session = Session {
      generation,
      token: CancellationToken::new(),
      retry_now: Arc::new(Notify::new()),
    };
    let previous = st.task.take();
    let inner = Arc::clone(&self.inner);
    let token = session.token.clone();
    let retry_now = Arc::clone(&session.retry_now);

    st.session = Some(session);
    st.task = Some(tokio::spawn(async move {
      if let Some(previous) = previous {
        // Never overlap with the teardown of an earlier session.
        let _ = previous.await;
      }
      inner.run_session(generation, token, retry_now).await;
    }));

    info!(source = %self.inner.source, feed = self.inner.adapter.name(), "Feed connection starting");
  }

  fn stop(&self) {
    let mut st = self.inner.state.lock();
    if let Some(session) = st.session.take() {
      session.token.cancel();
      st.closing = Some(session.generation);
      st.status = FeedStatus::Closing;
      info!(source = %self.inner.source, "Feed connection stopping");
    }
  }

  fn status(&self) -> FeedStatus {
    self.inner.state.lock().status
  }
}

impl<A: FeedAdapter> Inner<A> {
  fn is_current(st: &ConnState, generation: u64) -> bool {
    st.session.as_ref().map(|s| s.generation) == Some(generation)
  }

  /// Update status if `generation` is still the live session.
  fn set_status(&self, generation: u64, status: FeedStatus) -> bool {
    let mut st = self.state.lock();
    if !Self::is_current(&st, generation) {
      return false;
    }
    st.status = status;
    true
  }

  /// Send an event if `generation` is still the live session.
  fn emit(&self, generation: u64, event: FeedEvent) -> bool {
    let mut st = self.state.lock();
    if !Self::is_current(&st, generation) {
      return false;
    }
    if let FeedEvent::QuoteReceived(q) = &event {
      st.last_tick_at = Some(q.observed_at);
    }
    self
      .events
      .send(FailoverEvent::feed(self.source, event))
      .is_ok()
  }

  /// Update status and emit in one critical section.
  fn transition(&self, generation: u64, status: FeedStatus, event: FeedEvent) -> bool {
    let mut st = self.state.lock();
    if !Self::is_current(&st, generation) {
      return false;
    }
    st.status = status;
    self
      .events
      .send(FailoverEvent::feed(self.source, event))
      .is_ok()
  }

  /// Mark the torn-down session closed, unless a newer one took over.
  fn finish(&self, generation: u64) {
    let mut st = self.state.lock();
    if st.closing == Some(generation) && st.session.is_none() {
      st.closing = None;
      st.status = FeedStatus::Closed;
      debug!(source = %self.source, generation, "Feed session closed");
    }
  }

  async fn run_session(
    &self,
    generation: u64,
    token: CancellationToken,
    retry_now: Arc<Notify>,
  ) {
    loop {
      if !self.set_status(generation, FeedStatus::Connecting) {
        break;
      }

      let connected = tokio::select! {
        biased;
        _ = token.cancelled() => break,
        res = self.adapter.connect() => res,
      };

      match connected {
        Ok(mut handle) => {
          self.backoff_attempt.store(0, Ordering::Relaxed);
          if !self.transition(generation, FeedStatus::Open, FeedEvent::Connected) {
            self.adapter.close(handle).await;
            break;
          }
          info!(source = %self.source, feed = self.adapter.name(), "Feed connected");

          let end = self.stream(generation, &token, &mut handle).await;
          self.adapter.close(handle).await;

          match end {
            StreamEnd::Cancelled => break,
            StreamEnd::Closed(reason) => {
              warn!(source = %self.source, reason = %reason, "Feed disconnected");
              if !self.transition(
                generation,
                FeedStatus::Closed,
                FeedEvent::Disconnected { reason },
              ) {
                break;
              }
            }
          }
        }
        Err(e) => {
          warn!(source = %self.source, error = %e, "Feed connect failed");
          if !self.transition(
            generation,
            FeedStatus::Closed,
            FeedEvent::ConnectFailed {
              reason: e.to_string(),
            },
          ) {
            break;
          }
        }
      }

      let attempt = self.backoff_attempt.load(Ordering::Relaxed);
      let delay = self.policy.delay(attempt);
      self
        .backoff_attempt
        .store(self.policy.next_attempt(attempt), Ordering::Relaxed);

      info!(
        source = %self.source,
        attempt = attempt + 1,
        delay_ms = delay.as_millis() as u64,
        "Reconnecting after backoff"
      );

      tokio::select! {
        biased;
        _ = token.cancelled() => break,
        _ = retry_now.notified() => {}
        _ = tokio::time::sleep(delay) => {}
      }
    }

    self.finish(generation);
  }

  async fn stream(
    &self,
    generation: u64,
    token: &CancellationToken,
    handle: &mut A::Handle,
  ) -> StreamEnd {
    loop {
      let next = tokio::select! {
        biased;
        _ = token.cancelled() => return StreamEnd::Cancelled,
        msg = self.adapter.receive(handle) => msg,
      };

      match next {
        Some(Ok(payload)) => self.ingest(generation, RawMessage::now(payload)),
        Some(Err(e)) if e.is_per_message() => {
          debug!(source = %self.source, error = %e, "Dropping unreadable frame");
        }
        Some(Err(e)) => return StreamEnd::Closed(e.to_string()),
        None => return StreamEnd::Closed("stream ended".to_string()),
      }
    }
  }

  fn ingest(&self, generation: u64, raw: RawMessage) {
    let quotes = match self.adapter.parse(self.source, &raw) {
      Ok(quotes) => quotes,
      Err(e) => {
        debug!(source = %self.source, error = %e, "Dropping malformed message");
        return;
      }
    };

    for quote in quotes {
      if let Err(rejection) = self.validator.check(&quote) {
        debug!(source = %self.source, reason = %rejection, "Quote rejected");
        continue;
      }
      if !self.emit(generation, FeedEvent::QuoteReceived(quote)) {
        return;
      }
    }
  }
}
