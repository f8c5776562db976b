//! Unified error types for the rack workspace.
//!
//! Each stage of the local lifecycle reports its own error kind. The
//! supervisor and the CLI aggregate them into [`RackError`]. Every
//! `Display` implementation renders a single line so the CLI can print one
//! diagnostic per error.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ProcessExit;

/// Failure reported by the container engine adapter.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine executable could not be located.
    #[error("container engine `{binary}` not found on PATH")]
    NotFound {
        /// Executable that was looked up.
        binary: String,
    },

    /// The engine process could not be started.
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine ran but reported failure.
    #[error("`{command}` failed with {exit}")]
    Failed {
        /// Rendered command line.
        command: String,
        /// How the engine process ended.
        exit: ProcessExit,
    },

    /// The engine produced output that could not be interpreted.
    #[error("unexpected output from `{command}`: {message}")]
    Output {
        /// Rendered command line.
        command: String,
        /// Description of the problem.
        message: String,
    },
}

/// Manifest loading failures.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No manifest file exists at the expected location.
    #[error("manifest not found: {}", path.display())]
    MissingManifest {
        /// Expected manifest path.
        path: PathBuf,
    },

    /// The manifest or its directory could not be read.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The manifest is not well-formed YAML of the expected shape.
    #[error("invalid YAML in {}: {message}", path.display())]
    Syntax {
        /// Manifest path.
        path: PathBuf,
        /// Decoder message, including the location when known.
        message: String,
    },

    /// A line of the `.env` file could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    EnvFile {
        /// Path of the environment file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// The manifest decoded but violates a schema rule.
    #[error("invalid manifest: {detail}")]
    Invalid {
        /// Description of the violated rule.
        detail: String,
    },
}

/// Configuration problems detected before any container is started.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two services publish the same host port.
    #[error("host port {port} is declared by more than one service: {}", services.join(", "))]
    PortConflict {
        /// Conflicting host port.
        port: u16,
        /// Services declaring it, sorted.
        services: Vec<String>,
    },

    /// Wanted host ports already accept connections.
    #[error("ports in use: {}", join_ports(ports))]
    PortsInUse {
        /// Ports found open, in manifest order.
        ports: Vec<u16>,
    },

    /// Environment variables referenced by name have no value.
    #[error("missing environment variables: {}", names.join(", "))]
    MissingEnvironment {
        /// Deduplicated, sorted variable names.
        names: Vec<String>,
    },

    /// The link graph contains a cycle.
    #[error("dependency cycle among services: {}", services.join(", "))]
    Cycle {
        /// Services that could not be ordered, sorted.
        services: Vec<String>,
    },

    /// A service label carries a value that cannot be interpreted.
    #[error("service {service}: invalid label {label}={value}")]
    InvalidLabel {
        /// Service carrying the label.
        service: String,
        /// Label key.
        label: String,
        /// Offending value.
        value: String,
    },
}

/// Stage of an image operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePhase {
    /// Building a context.
    Build,
    /// Pulling a pre-built image.
    Pull,
    /// Retagging to the canonical name.
    Tag,
    /// Pushing to a registry.
    Push,
    /// Authenticating against a registry.
    Login,
}

impl fmt::Display for ImagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Pull => write!(f, "pull"),
            Self::Tag => write!(f, "tag"),
            Self::Push => write!(f, "push"),
            Self::Login => write!(f, "login"),
        }
    }
}

/// Failures while producing, retagging, or publishing images.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A build context could not be resolved on disk.
    #[error("service {service}: cannot resolve build context {}: {source}", path.display())]
    Context {
        /// Service declaring the context.
        service: String,
        /// Context path as resolved against the manifest directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine rejected an image operation.
    #[error("{phase} of {target} failed: {source}")]
    Engine {
        /// Operation that failed.
        phase: ImagePhase,
        /// Context, image, or tag the operation targeted.
        target: String,
        /// Adapter failure.
        source: EngineError,
    },
}

/// Failures of a single running service.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A port declaration has neither the `container` nor the
    /// `host:container` shape.
    #[error("service {service}: unknown port declaration: {port}")]
    InvalidPort {
        /// Service declaring the port.
        service: String,
        /// Offending declaration.
        port: String,
    },

    /// The container process could not be started.
    #[error("service {service}: {source}")]
    Spawn {
        /// Service being started.
        service: String,
        /// Adapter failure.
        source: EngineError,
    },

    /// The container process ended unsuccessfully.
    #[error("service {service} exited with {exit}")]
    Exited {
        /// Service that exited.
        service: String,
        /// How the process ended.
        exit: ProcessExit,
    },

    /// Reading the container output failed.
    #[error("service {service}: log stream error: {source}")]
    Stream {
        /// Service whose stream failed.
        service: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RackError {
    /// Manifest loading failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Pre-start configuration check failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Image build, pull, tag, or push failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A service failed at runtime.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A direct engine call failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Teardown was triggered by a signal.
    #[error("interrupted by signal")]
    Interrupted,

    /// An invariant was violated at runtime.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
}

impl RackError {
    /// Returns whether this error is the expected outcome of a signal-driven
    /// teardown rather than a failure.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RackError>;

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
