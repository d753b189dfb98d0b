//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Feed endpoints, instrument mappings and failover timings are
//! externalized here - nothing is hardcoded in the domain layer.

pub mod loader;

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::backoff::BackoffPolicy;
use crate::domain::quote::{CrossedQuotePolicy, InstrumentId, QuoteValidator};

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any feed is started.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  #[serde(default)]
  pub service: ServiceConfig,
  /// Failover timings and quote policy.
  #[serde(default)]
  pub failover: FailoverConfig,
  /// Primary (order-book) feed endpoint.
  #[serde(default)]
  pub primary: BinanceConfig,
  /// Secondary (oracle) feed endpoint.
  #[serde(default)]
  pub secondary: PythConfig,
  /// Tracked instruments and their upstream identifiers.
  pub instruments: Vec<InstrumentConfig>,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

impl AppConfig {
  /// Names of all tracked instruments.
  pub fn tracked_instruments(&self) -> HashSet<InstrumentId> {
    self.instruments.iter().map(|i| i.name.clone()).collect()
  }

  /// Quote admission check built from the tracked set and policy.
  pub fn quote_validator(&self) -> QuoteValidator {
    QuoteValidator::new(self.tracked_instruments(), self.failover.crossed_quotes)
  }
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
    }
  }
}

/// Floor for timer periods built from config values.
const MIN_PERIOD_MS: u64 = 1;

/// Failover state machine and reconnect timings.
#[derive(Debug, Clone, Deserialize)]
pub struct FailoverConfig {
  /// Primary idle time after which the watchdog fails over (ms).
  #[serde(default = "default_stale_timeout")]
  pub stale_timeout_ms: u64,
  /// Watchdog polling interval (ms).
  #[serde(default = "default_watchdog_interval")]
  pub watchdog_interval_ms: u64,
  /// First reconnect delay (ms).
  #[serde(default = "default_base_backoff")]
  pub base_backoff_ms: u64,
  /// Reconnect delay ceiling (ms).
  #[serde(default = "default_max_backoff")]
  pub max_backoff_ms: u64,
  /// Handling of quotes with ask < bid.
  #[serde(default)]
  pub crossed_quotes: CrossedQuotePolicy,
}

impl FailoverConfig {
  pub fn stale_timeout(&self) -> Duration {
    Duration::from_millis(self.stale_timeout_ms)
  }

  /// Never zero: a zero period would panic the watchdog interval.
  pub fn watchdog_interval(&self) -> Duration {
    Duration::from_millis(self.watchdog_interval_ms.max(MIN_PERIOD_MS))
  }

  /// Backoff policy shared by both connections. The base delay is
  /// clamped so a reconnect loop can never spin.
  pub fn backoff_policy(&self) -> BackoffPolicy {
    BackoffPolicy::new(
      Duration::from_millis(self.base_backoff_ms.max(MIN_PERIOD_MS)),
      Duration::from_millis(self.max_backoff_ms),
    )
  }
}

impl Default for FailoverConfig {
  fn default() -> Self {
    Self {
      stale_timeout_ms: default_stale_timeout(),
      watchdog_interval_ms: default_watchdog_interval(),
      base_backoff_ms: default_base_backoff(),
      max_backoff_ms: default_max_backoff(),
      crossed_quotes: CrossedQuotePolicy::default(),
    }
  }
}

/// Binance combined-stream endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
  /// WebSocket base URL (streams are appended).
  #[serde(default = "default_binance_ws")]
  pub ws_url: String,
}

impl Default for BinanceConfig {
  fn default() -> Self {
    Self {
      ws_url: default_binance_ws(),
    }
  }
}

/// Pyth Hermes endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PythConfig {
  /// Hermes base URL.
  #[serde(default = "default_hermes")]
  pub endpoint: String,
  /// TCP/TLS connect timeout (ms).
  #[serde(default = "default_connect_timeout")]
  pub connect_timeout_ms: u64,
}

impl Default for PythConfig {
  fn default() -> Self {
    Self {
      endpoint: default_hermes(),
      connect_timeout_ms: default_connect_timeout(),
    }
  }
}

/// One tracked instrument.
///
/// Maps the common instrument id to each source's own identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
  /// Common identifier used in emitted quotes (e.g. "BTC").
  pub name: String,
  /// Binance symbol (e.g. "BTCUSDT").
  pub binance_symbol: String,
  /// Pyth price feed id (hex, with or without 0x).
  pub pyth_feed_id: String,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "quote-failover".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_stale_timeout() -> u64 {
  5_000
}

fn default_watchdog_interval() -> u64 {
  1_000
}

fn default_base_backoff() -> u64 {
  1_000
}

fn default_max_backoff() -> u64 {
  15_000
}

fn default_binance_ws() -> String {
  "wss://stream.binance.com:443".to_string()
}

fn default_hermes() -> String {
  "https://hermes.pyth.network".to_string()
}

fn default_connect_timeout() -> u64 {
  10_000
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
