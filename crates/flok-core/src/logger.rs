//! Injected logging for the engine.
//!
//! The engine never touches the global `log` facade for its own run output.
//! It writes through the [`log::Log`] implementation it was built with, which
//! defaults to [`NopLogger`]. Binaries decide where messages go.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

/// Target name attached to every record the engine emits
pub const LOG_TARGET: &str = "flok";

/// A logger that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLogger;

impl Log for NopLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        false
    }

    fn log(&self, _record: &Record<'_>) {}

    fn flush(&self) {}
}

/// Cheaply clonable handle to the logger an engine was constructed with
#[derive(Clone)]
pub struct EngineLogger {
    inner: Arc<dyn Log>,
}

impl EngineLogger {
    /// Wrap a `log::Log` implementation
    pub fn new(inner: Arc<dyn Log>) -> Self {
        Self { inner }
    }

    /// A logger that drops every message
    pub fn discard() -> Self {
        Self::new(Arc::new(NopLogger))
    }

    /// Emit one message at `level`
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(LOG_TARGET).build();
        if !self.inner.enabled(&metadata) {
            return;
        }
        self.inner.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    pub fn flush(&self) {
        self.inner.flush();
    }
}

impl Default for EngineLogger {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for EngineLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLogger").finish_non_exhaustive()
    }
}

/// `emit!(logger, Info, "format {}", args)` writes through an [`EngineLogger`].
macro_rules! emit {
    ($logger:expr, $level:ident, $($arg:tt)+) => {
        $logger.log(::log::Level::$level, format_args!($($arg)+))
    };
}

pub(crate) use emit;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<(Level, String)>>,
    }

    impl Log for Capture {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record<'_>) {
            self.lines
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_discard_logger_is_silent() {
        let logger = EngineLogger::discard();
        emit!(logger, Error, "nothing {}", "happens");
    }

    #[test]
    fn test_enabled_levels_are_forwarded() {
        let capture = Arc::new(Capture::default());
        let logger = EngineLogger::new(capture.clone());

        emit!(logger, Info, "{} of {} migrations pending", 0, 3);
        emit!(logger, Debug, "filtered out");

        let lines = capture.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], (Level::Info, "0 of 3 migrations pending".to_string()));
    }
}
