//! Run errors and their classification into exit codes

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::{self, Write as _};
use std::io;

use thiserror::Error;

use crate::config::SettingsError;
use crate::engine::EngineError;
use crate::exitcode;

/// A user-reportable failure raised by tool logic or configuration.
///
/// Carries the backtrace of the point where it was raised; it is shown
/// in full when the run ends with this error.
#[derive(Debug)]
pub struct DomainError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl DomainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            backtrace: Backtrace::force_capture(),
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new(message)
        }
    }

    /// Message, cause chain and backtrace, ready to print.
    pub fn trace(&self) -> String {
        let mut report = error_chain(self);
        if self.backtrace.status() == BacktraceStatus::Captured {
            let _ = write!(report, "\n\nStack backtrace:\n{}", self.backtrace);
        }
        report
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for DomainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<SettingsError> for DomainError {
    fn from(e: SettingsError) -> Self {
        DomainError::new(e.to_string())
    }
}

impl From<EngineError> for DomainError {
    fn from(e: EngineError) -> Self {
        DomainError::new(e.to_string())
    }
}

/// Everything that can end a tool's main routine early.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("interrupted")]
    Interrupted,

    /// Failure the tool already logged; ends the run without a trace.
    #[error("{message}")]
    Fatal { message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type for tool routines.
pub type RunResult<T> = Result<T, RunError>;

impl From<SettingsError> for RunError {
    fn from(e: SettingsError) -> Self {
        RunError::Domain(e.into())
    }
}

impl From<EngineError> for RunError {
    fn from(e: EngineError) -> Self {
        RunError::Domain(e.into())
    }
}

impl RunError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Domain(_) => exitcode::SOFTWARE,
            RunError::Interrupted => exitcode::TEMPFAIL,
            RunError::Fatal { .. } => exitcode::SOFTWARE,
            RunError::Io(e) if is_broken_pipe(e) => exitcode::IOERR,
            RunError::Io(_) => exitcode::FAILURE,
        }
    }
}

/// Whether the reader at the other end of our output went away.
pub fn is_broken_pipe(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::BrokenPipe || e.raw_os_error() == Some(libc::EPIPE)
}

/// Render an error followed by its `source()` chain.
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut report = err.to_string();
    let mut causes = std::iter::successors(err.source(), |e| (*e).source()).peekable();
    if causes.peek().is_some() {
        report.push_str("\n\nCaused by:");
        for (i, cause) in causes.enumerate() {
            let _ = write!(report, "\n    {}: {}", i, cause);
        }
    }
    report
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitSignal {
    /// Normal return, with the code the tool asked for (0 by default)
    Success { return_code: i32 },
    /// `--version` was printed
    VersionPrinted,
    /// The argument parser printed help or rejected the command line
    UsageError { code: i32, message: String },
    /// Cancelled by the user
    Interrupted,
    /// Output went to a closed pipe
    IoFailure { errno: Option<i32>, message: String },
    /// A domain error, with its full trace
    SoftwareFailure { trace: String },
    /// A failure already reported in the log
    Fatal { message: String },
}

impl ExitSignal {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitSignal::Success { return_code } => *return_code,
            ExitSignal::VersionPrinted => exitcode::OK,
            ExitSignal::UsageError { code, .. } => *code,
            ExitSignal::Interrupted => exitcode::TEMPFAIL,
            ExitSignal::IoFailure { .. } => exitcode::IOERR,
            ExitSignal::SoftwareFailure { .. } | ExitSignal::Fatal { .. } => exitcode::SOFTWARE,
        }
    }
}

/// Classify a failed run.
///
/// Only broken pipes are classified among I/O failures; any other I/O
/// error is handed back unchanged for the caller to report.
pub fn classify(err: RunError) -> Result<ExitSignal, RunError> {
    match err {
        RunError::Domain(e) => Ok(ExitSignal::SoftwareFailure { trace: e.trace() }),
        RunError::Interrupted => Ok(ExitSignal::Interrupted),
        RunError::Fatal { message } => Ok(ExitSignal::Fatal { message }),
        RunError::Io(e) if is_broken_pipe(&e) => Ok(ExitSignal::IoFailure {
            errno: e.raw_os_error(),
            message: e.to_string(),
        }),
        RunError::Io(e) => Err(RunError::Io(e)),
    }
}
