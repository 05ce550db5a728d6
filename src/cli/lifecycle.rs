//! Run lifecycle shared by all tools
//!
//! `Init → OptionsParsed → ConfigLoaded → EngineReady → Executing →
//! {Succeeded, Failed} → Terminated`, with `--version`, `--help` and usage
//! errors ending the run right after parsing.
//!
//! Once options are parsed, the total run time is logged exactly once,
//! however `Executing` ends.

use std::error::Error;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::level_filters::LevelFilter;
use tracing::{debug, error, warn, Level};

use crate::cli::error::{classify, DomainError, ExitSignal, RunError, RunResult};
use crate::cli::interrupt;
use crate::cli::logging::{log_at, LogContext};
use crate::cli::options::{OptionRegistry, ParseOutcome, ParsedOptions};
use crate::cli::output::{self, Console};
use crate::config::Settings;
use crate::connection::ConnectionResolver;
use crate::engine::{Connector, Endpoint, Engine};
use crate::usage;

/// A command line tool running inside the harness.
pub trait Tool {
    /// Program name shown in usage and version output.
    const NAME: &'static str;

    /// Positional argument synopsis.
    const ARGS_HELP: &'static str = "<args>...";

    /// Paragraph shown under the usage line.
    const DESCRIPTION: &'static str = "";

    /// Lines appended after the option list.
    const ADDITIONAL_HELP: &'static [&'static str] = &[];

    const COPYRIGHT: &'static str = "";

    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// Whether the tool reads the configuration and accepts `-U/--url`.
    const WITH_CONFIG: bool = true;

    /// Whether options may follow positional arguments.
    const INTERMIXED_ARGS: bool = false;

    /// Level of user-visible standard messages, including the total time.
    const STD_LOG_LEVEL: Level = Level::INFO;

    /// Register tool-specific options.
    fn add_options(&self, _options: &mut OptionRegistry) {}

    /// The tool's main routine.
    fn execute(&mut self, ctx: &mut RunContext<'_>) -> RunResult<()>;
}

/// Version string with build platform, e.g. `0.3.0 on linux-x86_64`.
pub fn version_info(version: &str) -> String {
    format!(
        "{} on {}-{}",
        version,
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// State a tool works with during `Executing`.
pub struct RunContext<'a> {
    started: Instant,
    options: ParsedOptions,
    settings: Settings,
    connector: &'a dyn Connector,
    engine: Option<Box<dyn Engine>>,
    return_code: i32,
    console: &'a mut Console,
}

impl<'a> RunContext<'a> {
    pub fn new(
        options: ParsedOptions,
        settings: Settings,
        connector: &'a dyn Connector,
        console: &'a mut Console,
    ) -> Self {
        Self {
            started: Instant::now(),
            options,
            settings,
            connector,
            engine: None,
            return_code: 0,
            console,
        }
    }

    pub fn options(&self) -> &ParsedOptions {
        &self.options
    }

    /// Positional arguments.
    pub fn args(&self) -> &[String] {
        self.options.args()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Alias resolution against the loaded configuration.
    pub fn resolver(&self) -> ConnectionResolver<'_> {
        self.settings.resolver()
    }

    /// Handle for the configured daemon, connected on first use.
    pub fn engine(&mut self) -> RunResult<&dyn Engine> {
        if self.engine.is_none() {
            let target = self.resolver().resolve_one(&self.settings.scgi_url);
            let endpoint = Endpoint::parse(&target)?;
            self.engine = Some(self.connector.connect(&endpoint)?);
        }
        self.engine
            .as_deref()
            .ok_or_else(|| DomainError::new("no engine connection").into())
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_some()
    }

    /// Exit code for a successful run.
    pub fn set_return_code(&mut self, code: i32) {
        self.return_code = code;
    }

    pub fn return_code(&self) -> i32 {
        self.return_code
    }

    /// Time since the tool started executing.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fail the run with `message`, logged as `message (source)`.
    ///
    /// With `--debug` the failure keeps its cause chain and backtrace for
    /// the final trace; otherwise the run ends with `SOFTWARE` and nothing
    /// beyond the log line.
    pub fn fatal(
        &self,
        message: &str,
        source: Option<Box<dyn Error + Send + Sync + 'static>>,
    ) -> RunError {
        let logged = match &source {
            Some(cause) => format!("{} ({})", message, cause),
            None => message.to_string(),
        };
        error!("{}", logged);

        if self.options.log_level() != Some(LevelFilter::DEBUG) {
            return RunError::Fatal { message: logged };
        }
        match source {
            Some(cause) => DomainError::with_source(message, cause).into(),
            None => DomainError::new(message).into(),
        }
    }

    /// Summary of the RPC traffic so far.
    pub fn rpc_stats(&self) -> String {
        usage::summarize(self.connector.stats())
    }

    /// Standard output of the run.
    pub fn out(&mut self) -> &mut dyn Write {
        self.console.out.as_mut()
    }

    /// Diagnostic output of the run.
    pub fn err(&mut self) -> &mut dyn Write {
        self.console.err.as_mut()
    }
}

/// Logs the total run time when dropped.
struct RunTimer {
    started: Instant,
    level: Level,
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        let running_time = self.started.elapsed().as_secs_f64();
        log_at(
            self.level,
            &format!("Total time: {:.3} seconds.", running_time),
        );
    }
}

/// Drives one tool invocation from argument parsing to exit code.
pub struct Lifecycle {
    logging: LogContext,
    console: Console,
    connector: Box<dyn Connector>,
    config_dir: Option<PathBuf>,
}

impl Lifecycle {
    pub fn new(logging: LogContext, console: Console, connector: Box<dyn Connector>) -> Self {
        Self {
            logging,
            console,
            connector,
            config_dir: None,
        }
    }

    /// Read configuration from `dir` instead of the XDG config directory.
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Run `tool` on `argv` (program name first).
    ///
    /// Returns how the run ended. Failures the classifier does not handle
    /// (I/O errors other than a broken pipe) are returned as `Err`, after
    /// the total time was logged and logging was shut down. Logging is also
    /// shut down when the tool panics.
    pub fn run<T, I, S>(self, tool: &mut T, argv: I) -> Result<ExitSignal, RunError>
    where
        T: Tool,
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let Lifecycle {
            logging,
            mut console,
            connector,
            config_dir,
        } = self;
        let started = Instant::now();

        let result = logging.in_scope(|| -> Result<ExitSignal, RunError> {
            interrupt::reset();
            if let Err(e) = interrupt::install() {
                warn!("Cannot install interrupt handler: {}", e);
            }

            let options = match parse_options(tool, argv) {
                ParseOutcome::Parsed(options) => options,
                ParseOutcome::Version(text) => {
                    writeln!(console.out, "{}", text)?;
                    console.out.flush()?;
                    return Ok(ExitSignal::VersionPrinted);
                }
                ParseOutcome::ParserExit(e) => {
                    let code = e.exit_code();
                    let message = e.render().to_string();
                    if e.use_stderr() {
                        write!(console.err, "{}", message)?;
                    } else {
                        write!(console.out, "{}", message)?;
                        console.out.flush()?;
                    }
                    return Ok(ExitSignal::UsageError { code, message });
                }
            };

            if let Some(level) = options.log_level() {
                logging.set_level(level);
            }
            debug!("Options: {}", options);

            let _timer = RunTimer {
                started,
                level: T::STD_LOG_LEVEL,
            };

            let outcome = execute(tool, options, config_dir, connector.as_ref(), &mut console);
            match outcome {
                Ok(return_code) => Ok(ExitSignal::Success { return_code }),
                Err(err) => {
                    let signal = classify(err)?;
                    report(&signal, &mut console);
                    Ok(signal)
                }
            }
        });

        logging.shutdown();
        result
    }
}

fn parse_options<T, I, S>(tool: &T, argv: I) -> ParseOutcome
where
    T: Tool,
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let mut registry = OptionRegistry::new(T::NAME, &version_info(T::VERSION))
        .args_help(T::ARGS_HELP)
        .copyright(T::COPYRIGHT)
        .description(T::DESCRIPTION)
        .additional_help(T::ADDITIONAL_HELP);
    if T::WITH_CONFIG {
        registry
            .add_value(&["-U", "--url"], "URL to rTorrent instance")
            .metavar("URL");
    }
    tool.add_options(&mut registry);
    registry.parse(argv, T::INTERMIXED_ARGS)
}

/// `OptionsParsed → ConfigLoaded → Executing`; returns the tool's code.
fn execute<T: Tool>(
    tool: &mut T,
    options: ParsedOptions,
    config_dir: Option<PathBuf>,
    connector: &dyn Connector,
    console: &mut Console,
) -> RunResult<i32> {
    interrupt::check()?;
    let settings = if T::WITH_CONFIG {
        let mut settings = Settings::load(config_dir.as_deref())?;
        if let Some(url) = options.value("url") {
            settings.override_url(url);
        }
        settings.load_custom()?;
        debug!("Endpoint: {}", settings.scgi_url);
        settings
    } else {
        Settings::default()
    };

    let mut ctx = RunContext::new(options, settings, connector, console);
    let outcome = tool.execute(&mut ctx);
    interrupt::check()?;
    outcome?;
    let return_code = ctx.return_code();
    ctx.out().flush()?;
    Ok(return_code)
}

fn report(signal: &ExitSignal, console: &mut Console) {
    match signal {
        ExitSignal::SoftwareFailure { trace } => output::trace(console.err.as_mut(), trace),
        ExitSignal::Interrupted => {
            writeln!(console.err).ok();
            error!("Aborted by CTRL-C!");
        }
        ExitSignal::IoFailure { message, .. } => output::broken_pipe(console.err.as_mut(), message),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SessionConnector;
    use crate::exitcode;
    use crate::util::testing::SharedBuffer;
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;

    struct Probe {
        calls: usize,
    }

    impl Tool for Probe {
        const NAME: &'static str = "rtprobe";
        const WITH_CONFIG: bool = false;

        fn execute(&mut self, ctx: &mut RunContext<'_>) -> RunResult<()> {
            self.calls += 1;
            let line = ctx.args().join(" ");
            writeln!(ctx.out(), "args: {}", line)?;
            Ok(())
        }
    }

    fn lifecycle(out: &SharedBuffer, log: &SharedBuffer) -> Lifecycle {
        let log = log.clone();
        Lifecycle::new(
            LogContext::new(BoxMakeWriter::new(move || log.clone()), false, LevelFilter::WARN),
            Console::new(out.clone(), SharedBuffer::default()),
            Box::new(SessionConnector::default()),
        )
    }

    #[test]
    fn given_positionals_when_run_then_tool_executes_once() {
        let (out, log) = (SharedBuffer::default(), SharedBuffer::default());
        let mut probe = Probe { calls: 0 };

        let signal = lifecycle(&out, &log)
            .run(&mut probe, ["rtprobe", "-v", "a", "b"])
            .unwrap();

        assert_eq!(signal, ExitSignal::Success { return_code: 0 });
        assert_eq!(probe.calls, 1);
        assert_eq!(out.contents(), "args: a b\n");
        assert!(log.contents().contains("Total time: "));
    }

    #[test]
    fn given_no_logging_flag_when_run_then_total_time_below_threshold() {
        let (out, log) = (SharedBuffer::default(), SharedBuffer::default());
        let mut probe = Probe { calls: 0 };

        lifecycle(&out, &log).run(&mut probe, ["rtprobe"]).unwrap();

        assert!(!log.contents().contains("Total time"));
    }

    #[test]
    fn given_version_flag_when_run_then_tool_skipped() {
        let (out, log) = (SharedBuffer::default(), SharedBuffer::default());
        let mut probe = Probe { calls: 0 };

        let signal = lifecycle(&out, &log)
            .run(&mut probe, ["rtprobe", "--version"])
            .unwrap();

        assert_eq!(signal, ExitSignal::VersionPrinted);
        assert_eq!(signal.exit_code(), exitcode::OK);
        assert_eq!(probe.calls, 0);
        assert!(out.contents().starts_with("rtprobe "));
    }

    #[test]
    fn given_unknown_flag_when_run_then_usage_error() {
        let (out, log) = (SharedBuffer::default(), SharedBuffer::default());
        let mut probe = Probe { calls: 0 };

        let signal = lifecycle(&out, &log)
            .run(&mut probe, ["rtprobe", "--bogus"])
            .unwrap();

        assert_eq!(signal.exit_code(), exitcode::USAGE);
        assert_eq!(probe.calls, 0);
    }

    #[test]
    fn given_tool_without_config_when_run_then_no_url_option() {
        let (out, log) = (SharedBuffer::default(), SharedBuffer::default());
        let mut probe = Probe { calls: 0 };

        let signal = lifecycle(&out, &log)
            .run(&mut probe, ["rtprobe", "--url", "scgi://elsewhere:5000"])
            .unwrap();

        assert!(matches!(signal, ExitSignal::UsageError { .. }));
    }
}
