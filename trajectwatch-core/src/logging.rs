use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::errors::{Result, WatchError};

const DEFAULT_LEVEL: &str = "info";

/// Directives applied when `RUST_LOG` is unset. The HTTP client and server
/// internals stay at `warn` so poll ticks are not buried under connection noise.
fn default_directives(level: Option<&str>) -> String {
    let level = level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LEVEL);
    format!("{level},hyper=warn,reqwest=warn")
}

/// `rust_log` wins over `level` when set.
fn build_filter(rust_log: Option<String>, level: Option<&str>) -> Result<EnvFilter> {
    let directives = rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_directives(level));
    EnvFilter::try_new(&directives)
        .map_err(|err| WatchError::LoggingError(format!("invalid filter {directives:?}: {err}")))
}

/// Installs the global subscriber for the poller binary.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), level)?;

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .try_init()
        .map_err(|err| WatchError::LoggingError(err.to_string()))
}
