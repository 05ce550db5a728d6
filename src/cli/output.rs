//! Terminal output: the run's console streams and notice formatting
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use std::fmt::Display;
use std::io::{self, Write};

use colored::Colorize;

/// Output streams of a run. Tools write through these so that a closed
/// pipe surfaces as an I/O error instead of a panic.
pub struct Console {
    pub out: Box<dyn Write>,
    pub err: Box<dyn Write>,
}

impl Console {
    pub fn new(out: impl Write + 'static, err: impl Write + 'static) -> Self {
        Self {
            out: Box::new(out),
            err: Box::new(err),
        }
    }

    /// Process stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

/// Print error (red bold "error:" prefix)
pub fn error(w: &mut dyn Write, msg: &(impl Display + ?Sized)) {
    writeln!(w, "{}: {}", "error".red().bold(), msg).ok();
}

/// Print a failure trace, uncolored so it can be pasted into reports
pub fn trace(w: &mut dyn Write, trace: &str) {
    writeln!(w, "{}", trace).ok();
}

/// Print the short broken-pipe notice
pub fn broken_pipe(w: &mut dyn Write, msg: &(impl Display + ?Sized)) {
    write!(w, "\n{}, exiting!\n\n", msg).ok();
    w.flush().ok();
}
