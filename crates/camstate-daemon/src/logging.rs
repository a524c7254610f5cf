// crates/camstate-daemon/src/logging.rs
// ============================================================================
// Module: Logging Bootstrap
// Description: Installs the process-wide tracing subscriber.
// Purpose: Route diagnostics to stderr with a configurable filter.
// Dependencies: camstate-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! The filter comes from `[logging] filter` unless `CAMSTATE_LOG` is set.
//! Diagnostics go to stderr so stdout stays free for command output.

use camstate_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured filter.
pub const LOG_ENV_VAR: &str = "CAMSTATE_LOG";

/// Resolves the effective filter directive.
#[must_use]
pub fn filter_directive(config: &LoggingConfig) -> String {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.filter.clone())
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns a message when the filter does not parse or a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(filter_directive(config)).map_err(|err| err.to_string())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|err| err.to_string())
}
