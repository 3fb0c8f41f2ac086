//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `--verbose` CLI flag (debug)
//! 2. `BACKLOG_LOG` environment variable (e.g. "info", "backlog=debug")
//! 3. `log_level` in `.backlog/config.toml`
//! 4. default to `warn`
//!
//! Logs go to stderr so `--format json` output on stdout stays parseable.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "BACKLOG_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Initialise the global logging subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(verbose: bool, config_level: Option<&str>) -> Result<()> {
    let filter = resolve_filter(verbose, std::env::var(LOG_ENV).ok().as_deref(), config_level);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}

fn resolve_filter(verbose: bool, env: Option<&str>, config_level: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }

    [env, config_level]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .find_map(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
