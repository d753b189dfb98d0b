//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (WebSockets, HTTP streams, Prometheus).
//!
//! Adapter categories:
//! - `feeds`: upstream quote sources (Binance WebSocket, Pyth Hermes SSE)
//! - `metrics`: Prometheus metrics export and health checks
//! - `sinks`: consumers of the active quote stream

pub mod feeds;
pub mod metrics;
pub mod sinks;
