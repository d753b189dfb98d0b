//! Output Sinks - Consumers of the active quote stream.

pub mod tracing_sink;

pub use tracing_sink::TracingSink;
