//! Feed and failover error types.

use thiserror::Error;

/// Errors raised while talking to one upstream feed.
///
/// All of these are transient: they are recovered inside the feed
/// connection and only surface as lifecycle events.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed by peer: {0}")]
    Closed(String),

    #[error("Message parse error: {0}")]
    Parse(String),
}

impl FeedError {
    /// Whether this error is scoped to a single message.
    pub fn is_per_message(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Reasons a parsed quote is refused before reaching the controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuoteRejection {
    #[error("Instrument {0} is not tracked")]
    UntrackedInstrument(String),

    #[error("Invalid prices: bid={bid}, ask={ask}")]
    InvalidPrice { bid: f64, ask: f64 },

    #[error("Crossed quote: bid={bid} > ask={ask}")]
    Crossed { bid: f64, ask: f64 },
}

/// A state the failover logic should never reach. Signals a bug.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invariant violation: {0}")]
pub struct InvariantViolation(pub String);
