//! Logging context for one run
//!
//! The subscriber is owned by a [`LogContext`] instead of being installed
//! process-wide: the lifecycle enters it for the duration of the run, lowers
//! or raises its threshold once options are parsed, and shuts it down last.

use std::io::{self, Write};

use tracing::level_filters::LevelFilter;
use tracing::{debug, Dispatch, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, reload, Registry};

/// Threshold before any logging flag was seen.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

pub struct LogContext {
    dispatch: Dispatch,
    level: reload::Handle<LevelFilter, Registry>,
}

impl LogContext {
    /// Log to stderr at the default threshold.
    pub fn stderr() -> Self {
        Self::new(BoxMakeWriter::new(io::stderr), true, DEFAULT_LEVEL)
    }

    /// Log to `writer`, starting at `initial`.
    pub fn new(writer: BoxMakeWriter, ansi: bool, initial: LevelFilter) -> Self {
        let (filter, level) = reload::Layer::new(initial);

        let fmt_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_thread_names(false);

        let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);

        Self {
            dispatch: Dispatch::new(subscriber),
            level,
        }
    }

    /// Change the threshold for the rest of the run.
    pub fn set_level(&self, level: LevelFilter) {
        if let Err(e) = self.level.modify(|current| *current = level) {
            eprintln!("Error: Failed to change log level: {}", e);
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level.clone_current().unwrap_or(DEFAULT_LEVEL)
    }

    /// Run `f` with this context as the active subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Flush pending output and drop the subscriber.
    ///
    /// Dropping the context does the same, so a run that unwinds is
    /// finalized too.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        self.in_scope(|| debug!("logging shut down"));
        io::stdout().flush().ok();
        io::stderr().flush().ok();
    }
}

/// Emit `message` at a level chosen at runtime.
pub fn log_at(level: Level, message: &str) {
    match level {
        Level::ERROR => tracing::error!("{}", message),
        Level::WARN => tracing::warn!("{}", message),
        Level::INFO => tracing::info!("{}", message),
        Level::DEBUG => tracing::debug!("{}", message),
        Level::TRACE => tracing::trace!("{}", message),
    }
}
