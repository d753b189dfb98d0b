//! Domain layer - Quote model, events and backoff policy.
//!
//! Pure types with no I/O (hexagonal architecture inner ring).
//! Everything here is testable in isolation.

pub mod backoff;
pub mod error;
pub mod events;
pub mod quote;

// Re-export core types for convenience
pub use backoff::BackoffPolicy;
pub use error::{FeedError, InvariantViolation, QuoteRejection};
pub use events::{ChangeReason, FailoverEvent, FeedEvent, FeedStatus, SourceChange};
pub use quote::{CrossedQuotePolicy, InstrumentId, NormalizedQuote, QuoteValidator, Source};
