//! Console output for log records.
//!
//! Engine records and `log` macros are bridged into `tracing` and printed by
//! a `tracing-subscriber` fmt layer without colors: info and below to stdout,
//! warnings and errors to stderr. `--verbose` enables debug output and
//! `FLOK_LOG` (an `EnvFilter` directive) overrides the level.

use std::sync::Arc;
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// `log::Log` handed to the engine, forwarding into the installed subscriber
pub(crate) type ConsoleLogger = LogTracer;

/// Environment variable overriding the log filter
pub(crate) const LOG_ENV: &str = "FLOK_LOG";

pub(crate) fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Install the console subscriber and return the engine's logger
pub(crate) fn init(verbose: bool) -> Arc<ConsoleLogger> {
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);

    // also routes `log` macros through `LogTracer`
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    Arc::new(LogTracer::new())
}

#[cfg(test)]
#[path = "logger_test.rs"]
mod tests;
