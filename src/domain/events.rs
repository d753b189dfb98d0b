//! Events flowing into the failover controller and signals flowing out.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::quote::{NormalizedQuote, Source};

/// Lifecycle state of one feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Event emitted by a feed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A validated quote arrived.
    QuoteReceived(NormalizedQuote),
    /// The upstream connection is open.
    Connected,
    /// An open connection closed (peer close or transport error).
    Disconnected { reason: String },
    /// A connection attempt failed before opening.
    ConnectFailed { reason: String },
}

/// Entry in the controller's single serialized event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FailoverEvent {
    /// Event from one of the two feed connections.
    Feed { source: Source, event: FeedEvent },
    /// Watchdog tick at the given instant.
    StaleCheck { at: Instant },
}

impl FailoverEvent {
    /// Shorthand for a feed event.
    pub fn feed(source: Source, event: FeedEvent) -> Self {
        Self::Feed { source, event }
    }
}

/// Why the active source changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Primary ticked again while secondary was active.
    Recovered,
    /// Primary connection dropped or failed to connect.
    Degraded,
    /// Primary went quiet for longer than the stale timeout.
    StaleTimeout,
}

impl ChangeReason {
    /// Stable label for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recovered => "recovered",
            Self::Degraded => "degraded",
            Self::StaleTimeout => "stale_timeout",
        }
    }
}

/// Signal describing one active-source flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceChange {
    /// Source that is now authoritative.
    pub active: Source,
    /// Source that was authoritative before.
    pub previous: Source,
    pub reason: ChangeReason,
    /// Primary idle time observed by the watchdog (`None` = never ticked
    /// or not a stale-timeout flip).
    pub idle: Option<Duration>,
}
