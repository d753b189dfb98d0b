//! Feed Adapter Port - Upstream Source Interface
//!
//! Implementors own the transport and the wire format of one upstream
//! source. The feed connection drives them and never sees sockets,
//! keep-alive frames or envelope formats.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::error::FeedError;
use crate::domain::quote::{NormalizedQuote, Source};

/// One application payload, stamped at receipt.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Payload text as delivered by the transport.
    pub payload: String,
    /// Monotonic receipt instant.
    pub observed_at: Instant,
    /// Wall-clock receipt time (Unix ms).
    pub observed_at_ms: i64,
}

impl RawMessage {
    /// Stamp a payload with the current time.
    pub fn now(payload: String) -> Self {
        Self {
            payload,
            observed_at: Instant::now(),
            observed_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Trait for upstream price sources.
///
/// `receive` must be cancel-safe: the connection drops its future
/// whenever the session is stopped.
#[async_trait]
pub trait FeedAdapter: Send + Sync + 'static {
    /// Live connection state (socket, HTTP body stream, ...).
    type Handle: Send + 'static;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Establish a connection.
    async fn connect(&self) -> Result<Self::Handle, FeedError>;

    /// Next application payload; `None` once the upstream has closed.
    ///
    /// Keep-alive frames are answered here and never returned.
    async fn receive(&self, handle: &mut Self::Handle) -> Option<Result<String, FeedError>>;

    /// Tear the connection down.
    async fn close(&self, handle: Self::Handle);

    /// Turn a payload into quotes.
    ///
    /// Control frames and unknown instruments yield an empty vector;
    /// malformed payloads yield `FeedError::Parse`.
    fn parse(&self, source: Source, raw: &RawMessage) -> Result<Vec<NormalizedQuote>, FeedError>;
}
