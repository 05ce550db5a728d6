use std::io;
use std::process;

use rtcli::cli::commands::EndpointsTool;
use rtcli::cli::error::error_chain;
use rtcli::cli::{output, Console, Lifecycle, LogContext};
use rtcli::engine::SessionConnector;
use rtcli::exitcode;

fn main() {
    let lifecycle = Lifecycle::new(
        LogContext::stderr(),
        Console::stdio(),
        Box::new(SessionConnector::default()),
    );

    let code = match lifecycle.run(&mut EndpointsTool, std::env::args_os()) {
        Ok(signal) => signal.exit_code(),
        Err(e) => {
            output::error(&mut io::stderr(), &error_chain(&e));
            exitcode::FAILURE
        }
    };
    process::exit(code);
}
