//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    instruments = config.instruments.len(),
    stale_timeout_ms = config.failover.stale_timeout_ms,
    watchdog_interval_ms = config.failover.watchdog_interval_ms,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty, unique instrument definitions
/// - Positive timings and a sane backoff range
/// - Non-empty feed endpoints
fn validate_config(config: &AppConfig) -> Result<()> {
  // Instrument validation
  anyhow::ensure!(
    !config.instruments.is_empty(),
    "At least one instrument must be configured"
  );

  let mut names = HashSet::new();
  for (i, inst) in config.instruments.iter().enumerate() {
    anyhow::ensure!(!inst.name.is_empty(), "Instrument {} has empty name", i);
    anyhow::ensure!(
      names.insert(inst.name.as_str()),
      "Instrument {} is configured more than once",
      inst.name
    );
    anyhow::ensure!(
      !inst.binance_symbol.is_empty(),
      "Instrument {} has empty binance_symbol",
      inst.name
    );
    anyhow::ensure!(
      !inst.pyth_feed_id.is_empty(),
      "Instrument {} has empty pyth_feed_id",
      inst.name
    );
  }

  // Failover timings
  let f = &config.failover;
  anyhow::ensure!(f.stale_timeout_ms > 0, "stale_timeout_ms must be positive");
  anyhow::ensure!(
    f.watchdog_interval_ms > 0,
    "watchdog_interval_ms must be positive"
  );
  anyhow::ensure!(
    f.watchdog_interval_ms <= f.stale_timeout_ms,
    "watchdog_interval_ms ({}) must not exceed stale_timeout_ms ({})",
    f.watchdog_interval_ms,
    f.stale_timeout_ms
  );
  anyhow::ensure!(f.base_backoff_ms > 0, "base_backoff_ms must be positive");
  anyhow::ensure!(
    f.base_backoff_ms <= f.max_backoff_ms,
    "base_backoff_ms ({}) must not exceed max_backoff_ms ({})",
    f.base_backoff_ms,
    f.max_backoff_ms
  );

  // Endpoints
  anyhow::ensure!(
    !config.primary.ws_url.is_empty(),
    "Primary WebSocket URL must not be empty"
  );
  anyhow::ensure!(
    !config.secondary.endpoint.is_empty(),
    "Secondary endpoint must not be empty"
  );

  if config.metrics.enabled && config.metrics.bind_address.is_empty() {
    warn!("Metrics enabled with empty bind_address");
  }

  Ok(())
}
