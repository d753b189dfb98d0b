//! Use Cases Layer - Failover Core
//!
//! Orchestrates domain types with port interfaces to implement the
//! source-failover workflow.
//!
//! Use cases:
//! - `FeedConnection`: one source's connect/stream/backoff lifecycle
//! - `FailoverController`: the active-source state machine
//! - `Watchdog`: periodic primary liveness ticks
//! - `FailoverSupervisor`: wiring, task spawning and shutdown

pub mod failover_controller;
pub mod feed_connection;
pub mod supervisor;
pub mod watchdog;

pub use failover_controller::{ControllerStats, FailoverController};
pub use feed_connection::FeedConnection;
pub use supervisor::{FailoverHealth, FailoverSupervisor, SupervisorHandles};
pub use watchdog::Watchdog;
