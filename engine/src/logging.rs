//! Structured logging for the engine.
//!
//! `RUST_LOG` wins when set; otherwise the filter configured in
//! [`EngineConfig::log_filter`](crate::config::EngineConfig) applies, so a
//! node can ship with the engine subsystems at `debug` while dependencies
//! stay at `info`.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// `default_filter` is used when the `RUST_LOG` environment variable is not
/// set, e.g. `"info,strata_engine=debug"`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
