//! Output Sink Port - Consumer of the active quote stream.

use crate::domain::events::{FeedStatus, SourceChange};
use crate::domain::quote::{NormalizedQuote, Source};

/// Receives everything the failover controller publishes.
///
/// Calls are made from the controller's event loop, so
/// implementations must not block.
pub trait OutputSink: Send + Sync {
    /// A quote from the active source.
    fn on_active_quote(&self, quote: &NormalizedQuote);

    /// The active source flipped.
    fn on_source_changed(&self, change: &SourceChange);

    /// A feed connection reported a lifecycle change.
    fn on_feed_status(&self, _source: Source, _status: FeedStatus) {}
}
