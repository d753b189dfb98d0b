//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use-case layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `FeedAdapter`: one upstream source (connect, receive, close, parse)
//! - `FeedControl`: start/stop view of a feed connection
//! - `OutputSink`: receiver of the de-duplicated active quote stream

pub mod feed_adapter;
pub mod feed_control;
pub mod output_sink;

pub use feed_adapter::{FeedAdapter, RawMessage};
pub use feed_control::FeedControl;
pub use output_sink::OutputSink;
