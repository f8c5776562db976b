//! `rack build`: produce every service image without running anything.

use std::process::ExitCode;

use clap::Args;
use rack_build::{ExecuteOptions, RetryPolicy};

use super::{Project, engine};
use crate::output::{BOLD, DIM, GREEN, RESET};

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build without the engine's layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if a build, pull, or tag fails.
pub fn execute(args: &BuildArgs, project: &Project) -> anyhow::Result<ExitCode> {
    let engine = engine(&project.config)?;
    let options = ExecuteOptions {
        use_cache: !args.no_cache,
        retry: RetryPolicy::from_config(&project.config),
    };

    let plan = rack_runtime::lifecycle::build(&engine, &project.manifest, &project.app, &options)?;

    eprintln!(
        "  {GREEN}{BOLD}Built{RESET} {} context(s), pulled {} image(s)",
        plan.builds.len(),
        plan.pulls.len()
    );
    for (canonical, source) in &plan.tags {
        eprintln!("    {canonical} {DIM}<- {source}{RESET}");
    }
    Ok(ExitCode::SUCCESS)
}
