//! # rack: local app lifecycle CLI
//!
//! Starts a Compose-style app on the local container engine: builds and
//! pulls images, runs every service with prefixed output, and tears the
//! app down on Ctrl+C. Also builds, plans, and publishes app images.

#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;
mod signal;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match commands::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            output::print_failure(&e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never mix with container output on stdout.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
