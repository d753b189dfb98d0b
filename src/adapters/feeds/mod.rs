//! Market Data Feed Adapters - Real-time Quote Streaming
//!
//! Provides `FeedAdapter` implementations for:
//! - Binance: primary bookTicker WebSocket feed
//! - Pyth: secondary Hermes SSE oracle feed

pub mod binance;
pub mod pyth;

pub use binance::BinanceFeed;
pub use pyth::PythFeed;
