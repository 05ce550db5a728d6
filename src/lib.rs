//! Command-line harness for tools talking to an rTorrent daemon.
//!
//! A tool implements [`cli::Tool`] and hands itself to a [`cli::Lifecycle`],
//! which parses options, configures logging, loads the configuration,
//! connects on demand, runs the tool and maps the outcome to an exit code.

pub mod cli;
pub mod config;
pub mod connection;
pub mod engine;
pub mod exitcode;
pub mod usage;
pub mod util;
