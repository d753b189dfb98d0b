//! Feed Control Port - What the controller may do to a connection.

use crate::domain::events::FeedStatus;

/// Start/stop surface of a feed connection.
///
/// Both calls return immediately; the connection reports progress
/// through its events.
pub trait FeedControl: Send + Sync {
    /// Begin connecting. No-op while connecting or open.
    fn start(&self);

    /// Tear down and cancel any pending retry. Idempotent.
    fn stop(&self);

    /// Current lifecycle state.
    fn status(&self) -> FeedStatus;
}
