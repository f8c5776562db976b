//! # rack-engine
//!
//! The only place in the workspace that talks to the container engine.
//!
//! Everything else depends on the [`ContainerEngine`] capability trait:
//! - [`docker::DockerCli`] shells out to the engine executable.
//! - `fake::RecordingEngine` (feature `test-util`) records every call as a
//!   rendered command line and scripts container output for tests.
//!
//! Argument vectors are rendered by [`command`] so the real adapter and the
//! fake produce identical command lines.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod command;
pub mod docker;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::Path;

use rack_common::error::EngineError;
use rack_common::types::{ContainerName, ImageTag, ProcessExit};

pub use docker::DockerCli;

/// Result of an engine call.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A readable output stream of a running container.
pub type OutputStream = Box<dyn Read + Send>;

/// Options for an image build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Skip the layer cache and pull fresh base images.
    pub no_cache: bool,
    /// Alternate Dockerfile, relative to the build context.
    pub dockerfile: Option<String>,
}

/// Registry credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account e-mail.
    pub email: String,
    /// User name.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A container process started by [`ContainerEngine::run`].
pub trait ProcessHandle: Send {
    /// Takes the stdout stream. Returns `None` once taken.
    fn take_stdout(&mut self) -> Option<OutputStream>;

    /// Takes the stderr stream. Returns `None` once taken.
    fn take_stderr(&mut self) -> Option<OutputStream>;

    /// Blocks until the process ends.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the process fails.
    fn wait(&mut self) -> io::Result<ProcessExit>;
}

/// Capability surface of the container engine.
///
/// Implementors must be shareable across the supervisor's threads.
pub trait ContainerEngine: Send + Sync {
    /// Builds the image in `context` and tags it `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be run or reports failure.
    fn build(&self, context: &Path, tag: &ImageTag, options: &BuildOptions) -> EngineResult<()>;

    /// Pulls a pre-built image.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be run or reports failure.
    fn pull(&self, image: &str) -> EngineResult<()>;

    /// Tags `from` as `to`, replacing an existing `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be run or reports failure.
    fn tag(&self, from: &str, to: &str) -> EngineResult<()>;

    /// Tags `local` as `remote` and pushes `remote`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be run or reports failure.
    fn push(&self, local: &str, remote: &str) -> EngineResult<()>;

    /// Logs in to a registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be run or reports failure.
    fn login(&self, registry: &str, credentials: &Credentials) -> EngineResult<()>;

    /// Configured environment of an image, as `NAME -> VALUE`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be inspected or its metadata
    /// cannot be parsed.
    fn inspect_image(&self, image: &str) -> EngineResult<BTreeMap<String, String>>;

    /// Starts `run <args>` with stdout and stderr captured.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn run(&self, args: &[String]) -> EngineResult<Box<dyn ProcessHandle>>;

    /// Kills a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be run or reports failure.
    fn kill(&self, name: &ContainerName) -> EngineResult<()>;

    /// Removes a container, running or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be run or reports failure.
    fn remove_force(&self, name: &ContainerName) -> EngineResult<()>;
}

/// Splits `NAME=VALUE` entries of an image configuration into a map.
/// Entries without `=` map to an empty value.
pub fn env_map<I, S>(entries: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| match entry.as_ref().split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (entry.as_ref().to_string(), String::new()),
        })
        .collect()
}
