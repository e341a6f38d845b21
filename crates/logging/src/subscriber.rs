//! crates/logging/src/subscriber.rs
//! Process-wide subscriber installation.

use std::env;
use std::io;

use tracing_subscriber::EnvFilter;

use crate::config::VerbosityConfig;

/// Environment variable whose value replaces the verbosity-derived filter.
pub const LOG_ENV: &str = "BACKUP_TOOL_LOG";

/// Installs a stderr formatter filtered by `config`.
///
/// A non-empty [`LOG_ENV`] value takes precedence; if it fails to parse the
/// configured directives are used instead. Returns `false` when a global
/// subscriber was already installed, which leaves the existing one in place.
pub fn init(config: &VerbosityConfig) -> bool {
    let filter = env_filter(env::var(LOG_ENV).ok().as_deref(), config);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

fn env_filter(override_value: Option<&str>, config: &VerbosityConfig) -> EnvFilter {
    override_value
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(config.directives()))
}
