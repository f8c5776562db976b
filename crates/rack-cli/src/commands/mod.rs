//! CLI command definitions and dispatch.

pub mod build;
pub mod login;
pub mod plan;
pub mod push;
pub mod start;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rack_common::config::RackConfig;
use rack_engine::DockerCli;
use rack_manifest::Manifest;

/// rack: run Compose-style apps on a local container engine.
#[derive(Parser, Debug)]
#[command(name = "rack", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Manifest file, relative to the current directory.
    #[arg(long, short = 'f', global = true)]
    pub file: Option<PathBuf>,

    /// Application name; defaults to the manifest directory name.
    #[arg(long, short = 'a', global = true)]
    pub app: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build images and run every service until they exit or Ctrl+C.
    Start(start::StartArgs),
    /// Build, pull, and tag every service image.
    Build(build::BuildArgs),
    /// Show the start order and the build groups.
    Plan(plan::PlanArgs),
    /// Publish every service image to a registry.
    Push(push::PushArgs),
    /// Log in to a registry.
    Login(login::LoginArgs),
}

/// What every manifest-based command needs.
#[derive(Debug)]
pub struct Project {
    /// Effective configuration.
    pub config: RackConfig,
    /// Loaded manifest.
    pub manifest: Manifest,
    /// Application name.
    pub app: String,
}

impl Project {
    /// Loads the manifest selected by the global flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be loaded.
    pub fn load(file: Option<&Path>, app: Option<&str>) -> anyhow::Result<Self> {
        let config = RackConfig::from_env();
        let path = file.map_or_else(|| PathBuf::from(&config.manifest_file), Path::to_path_buf);
        let manifest = rack_manifest::load_file(&path)?;
        let app = app
            .map(ToString::to_string)
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| rack_runtime::app_name(manifest.dir()));
        anyhow::ensure!(!app.is_empty(), "cannot derive an app name from {}", manifest.dir().display());
        tracing::debug!(app = %app, services = manifest.len(), "manifest loaded");
        Ok(Self {
            config,
            manifest,
            app,
        })
    }
}

/// Locates the configured container engine.
///
/// # Errors
///
/// Returns an error if the engine executable is not on `PATH`.
pub fn engine(config: &RackConfig) -> anyhow::Result<DockerCli> {
    DockerCli::locate(&config.engine).context("container engine unavailable")
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let file = cli.file.as_deref();
    let app = cli.app.as_deref();
    match cli.command {
        Command::Start(args) => start::execute(&args, &Project::load(file, app)?),
        Command::Build(args) => build::execute(&args, &Project::load(file, app)?),
        Command::Plan(args) => plan::execute(&args, &Project::load(file, app)?),
        Command::Push(args) => push::execute(args, &Project::load(file, app)?),
        Command::Login(args) => login::execute(args),
    }
}
