//! Diagnostic logging setup
//!
//! Diagnostics go to stderr so trace records written to stdout stay
//! machine-readable.

use calltrace_config::Config;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber with the given `EnvFilter` directives
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init(filter: &str) -> Result<bool, ParseError> {
    let env_filter = EnvFilter::try_new(filter)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    if let Err(err) = init_result {
        tracing::debug!(error = %err, "tracing already initialized; skipping setup");
        return Ok(false);
    }
    Ok(true)
}

/// Install the subscriber using the configured filter
pub fn init_from_config(config: &Config) -> Result<bool, ParseError> {
    init(config.log_filter())
}
