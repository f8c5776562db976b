//! `rack start`: build images and run the app in the foreground.

use std::process::ExitCode;
use std::time::Instant;

use clap::Args;
use rack_manifest::env::ProcessEnv;
use rack_runtime::{OutputMux, StartOptions};

use super::{Project, engine};
use crate::output::{self, BOLD, DIM, GREEN, RESET};
use crate::signal;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Skip building and pulling; run the existing `app/service` images.
    #[arg(long)]
    pub no_build: bool,

    /// Build without the engine's layer cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Add this offset to every published host port.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub shift: i32,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if the engine or the signal handler is unavailable.
/// Run failures are printed and reflected in the exit code.
pub fn execute(args: &StartArgs, project: &Project) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    let engine = engine(&project.config)?;
    let interrupts = signal::install()?;

    eprintln!(
        "  {BOLD}{}{RESET} {DIM}{} service(s) from {}{RESET}",
        project.app,
        project.manifest.len(),
        project.manifest.dir().display()
    );

    let options = StartOptions {
        build: !args.no_build,
        use_cache: !args.no_cache,
        shift: args.shift,
        ..StartOptions::from_config(&project.app, &project.config)
    };
    let process_env = ProcessEnv::capture(&project.manifest);
    let mux = OutputMux::stdout(project.manifest.longest_name());

    let errors = rack_runtime::start(
        &engine,
        &project.manifest,
        &options,
        &process_env,
        mux,
        interrupts,
    );

    output::print_errors(&errors);
    let code = output::exit_status(&errors);
    if code == 0 {
        eprintln!(
            "  {GREEN}Stopped{RESET} after {:.1}s",
            started.elapsed().as_secs_f64()
        );
    }
    Ok(ExitCode::from(code))
}
