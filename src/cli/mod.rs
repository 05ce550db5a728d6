//! CLI layer: option parsing, logging, run lifecycle and error reporting

pub mod commands;
pub mod error;
pub mod interrupt;
pub mod lifecycle;
pub mod logging;
pub mod options;
pub mod output;

pub use error::{classify, DomainError, ExitSignal, RunError, RunResult};
pub use lifecycle::{Lifecycle, RunContext, Tool};
pub use logging::LogContext;
pub use options::{OptionRegistry, ParseOutcome, ParsedOptions};
pub use output::Console;
