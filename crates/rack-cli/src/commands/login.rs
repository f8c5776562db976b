//! `rack login`: authenticate the engine against a registry.

use std::process::ExitCode;

use clap::Args;
use rack_common::config::RackConfig;
use rack_common::constants::DEFAULT_LOGIN_EMAIL;
use rack_engine::Credentials;

use super::engine;
use crate::output::{GREEN, RESET};

/// Arguments for the `login` command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Registry host.
    pub registry: String,

    /// Registry user.
    #[arg(long, short = 'u')]
    pub username: String,

    /// Registry password.
    #[arg(long, short = 'p', env = "RACK_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Account email, for registries that still ask for one.
    #[arg(long, short = 'e', default_value = DEFAULT_LOGIN_EMAIL)]
    pub email: String,
}

/// Executes the `login` command.
///
/// # Errors
///
/// Returns an error if the engine rejects the credentials.
pub fn execute(args: LoginArgs) -> anyhow::Result<ExitCode> {
    let engine = engine(&RackConfig::from_env())?;
    let credentials = Credentials {
        email: args.email,
        username: args.username,
        password: args.password,
    };
    rack_build::push::login(&engine, &args.registry, &credentials)?;
    eprintln!("  {GREEN}Logged in{RESET} to {}", args.registry);
    Ok(ExitCode::SUCCESS)
}
