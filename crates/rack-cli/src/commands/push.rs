//! `rack push`: publish every service image to a registry.

use std::process::ExitCode;

use clap::Args;
use rack_build::RetryPolicy;
use rack_build::push::{self, PushOptions};

use super::{Project, engine};
use crate::output::{DIM, GREEN, RESET};

/// Arguments for the `push` command.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Registry host, optionally with a namespace.
    #[arg(long, short = 'r')]
    pub registry: String,

    /// Image tag [default: latest].
    #[arg(long, short = 't')]
    pub tag: Option<String>,

    /// Push all services into this one repository, tagged `service.tag`.
    #[arg(long)]
    pub flatten: Option<String>,
}

/// Executes the `push` command.
///
/// # Errors
///
/// Returns an error if tagging or pushing an image fails.
pub fn execute(args: PushArgs, project: &Project) -> anyhow::Result<ExitCode> {
    let engine = engine(&project.config)?;
    let options = PushOptions {
        registry: args.registry,
        tag: args.tag,
        flatten: args.flatten,
    };

    let pushed = push::push(
        &engine,
        &project.manifest,
        &project.app,
        &options,
        RetryPolicy::from_config(&project.config),
    )?;

    for target in &pushed {
        eprintln!("  {GREEN}pushed{RESET} {} {DIM}-> {}{RESET}", target.local, target.remote);
    }
    Ok(ExitCode::SUCCESS)
}
