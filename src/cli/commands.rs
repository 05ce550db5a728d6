//! The `rtcli` tool: resolve connection aliases to daemon endpoints

use tracing::{debug, info, warn};

use crate::cli::error::{DomainError, RunResult};
use crate::cli::interrupt;
use crate::cli::lifecycle::{RunContext, Tool};
use crate::cli::options::OptionRegistry;
use crate::engine::Endpoint;

/// How endpoints are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// As resolved from the alias table
    Plain,
    /// Parsed and normalized to a URL
    Url,
}

#[derive(Debug, Default)]
pub struct EndpointsTool;

impl Tool for EndpointsTool {
    const NAME: &'static str = "rtcli";
    const ARGS_HELP: &'static str = "[host-or-alias]...";
    const DESCRIPTION: &'static str =
        "Resolve host tokens through the connection aliases and print the daemon endpoints.";
    const ADDITIONAL_HELP: &'static [&'static str] = &[
        "Aliases come from the [connections] table of config.toml and custom.toml.",
        "Without arguments, the configured default endpoint is printed.",
    ];
    const INTERMIXED_ARGS: bool = true;

    fn add_options(&self, options: &mut OptionRegistry) {
        options.add_boolean(
            &["-m", "--fan-out"],
            "expand list-valued aliases into all of their endpoints",
        );
        options
            .add_value(&["-o", "--format"], "output format")
            .default_value("plain")
            .choices(&["plain", "url"]);
        options.add_boolean(&["--stats"], "report RPC usage when done");
        options.add_boolean(
            &["--dump-config"],
            "print the effective configuration and exit",
        );
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> RunResult<()> {
        if ctx.options().flag("dump_config") {
            let toml = ctx.settings().to_toml()?;
            write!(ctx.out(), "{}", toml)?;
            return Ok(());
        }

        let format = match ctx.options().value("format") {
            Some("url") => Format::Url,
            _ => Format::Plain,
        };

        if ctx.args().is_empty() {
            let endpoint = ctx.engine()?.endpoint().to_string();
            writeln!(ctx.out(), "{}", endpoint)?;
        } else {
            let tokens = ctx.args().to_vec();
            let fan_out = ctx.options().flag("fan_out");
            for token in &tokens {
                interrupt::check()?;

                let endpoints: Vec<String> = if fan_out {
                    ctx.resolver().resolve_many(token).collect()
                } else {
                    vec![ctx.resolver().resolve_one(token)]
                };
                debug!("{} -> {:?}", token, endpoints);
                if endpoints.is_empty() {
                    warn!("nothing to do for {}", token);
                    continue;
                }

                for endpoint in endpoints {
                    let line = render(&endpoint, format)?;
                    writeln!(ctx.out(), "{}", line)?;
                }
            }
        }

        if ctx.options().flag("stats") {
            let stats = ctx.rpc_stats();
            writeln!(ctx.out(), "{}", stats)?;
        }
        info!("Resolved in {:.3}s", ctx.elapsed().as_secs_f64());
        Ok(())
    }
}

fn render(endpoint: &str, format: Format) -> RunResult<String> {
    match format {
        Format::Plain => Ok(endpoint.to_string()),
        Format::Url => Endpoint::parse(endpoint)
            .map(|e| e.to_string())
            .map_err(|e| DomainError::with_source(format!("cannot use {endpoint:?}"), e).into()),
    }
}
