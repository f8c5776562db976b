//! Canonical, immutable manifest model.
//!
//! Built once by the [`loader`](crate::loader) and read-only afterwards.
//! Polymorphic YAML fields are already resolved into tagged variants here.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a service's image comes from. Exactly one source per service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Built from a local context.
    Build {
        /// Absolute build context path (symlinks not yet followed).
        context: PathBuf,
        /// Alternate Dockerfile, relative to the context.
        dockerfile: Option<String>,
    },
    /// Pulled as a pre-built image.
    Image(String),
}

/// The process a service runs, overriding the image default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServiceCommand {
    /// Use the image's default command.
    #[default]
    None,
    /// Run through `sh -c`.
    Shell(String),
    /// Passed to the engine as argv tokens.
    Argv(Vec<String>),
}

/// One canonical environment entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvEntry {
    /// `NAME`: the value comes from the process environment.
    Inherit(String),
    /// `NAME=VALUE`.
    Literal {
        /// Variable name.
        name: String,
        /// Variable value.
        value: String,
    },
}

impl EnvEntry {
    /// Parses `NAME` or `NAME=VALUE`, splitting on the first `=`.
    #[must_use]
    pub fn parse(entry: &str) -> Self {
        match entry.split_once('=') {
            Some((name, value)) => Self::Literal {
                name: name.to_string(),
                value: value.to_string(),
            },
            None => Self::Inherit(entry.to_string()),
        }
    }

    /// Variable name of the entry.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Inherit(name) | Self::Literal { name, .. } => name,
        }
    }
}

impl fmt::Display for EnvEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit(name) => write!(f, "{name}"),
            Self::Literal { name, value } => write!(f, "{name}={value}"),
        }
    }
}

/// A `links` entry: `target` or `target:alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Linked service.
    pub target: String,
    /// Host alias inside the dependent container.
    pub alias: String,
}

impl Link {
    /// Parses `target` or `target:alias`; the alias defaults to the target.
    #[must_use]
    pub fn parse(link: &str) -> Self {
        match link.split_once(':') {
            Some((target, alias)) => Self {
                target: target.to_string(),
                alias: alias.to_string(),
            },
            None => Self {
                target: link.to_string(),
                alias: link.to_string(),
            },
        }
    }
}

/// A normalized service entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Service name, unique within the manifest.
    pub name: String,
    /// Build context or pre-built image.
    pub source: ImageSource,
    /// Command override.
    pub command: ServiceCommand,
    /// Entrypoint override.
    pub entrypoint: Option<String>,
    /// Environment entries in declaration order.
    pub environment: Vec<EnvEntry>,
    /// Links to other services of the same manifest.
    pub links: Vec<Link>,
    /// Port declarations: `container` or `host:container`.
    pub ports: Vec<String>,
    /// Volume specs with absolute paths.
    pub volumes: Vec<String>,
    /// Labels by key.
    pub labels: BTreeMap<String, String>,
    /// Whether the container runs privileged.
    pub privileged: bool,
}

impl Service {
    /// Build context, if this service is built locally.
    #[must_use]
    pub fn build_context(&self) -> Option<&Path> {
        match &self.source {
            ImageSource::Build { context, .. } => Some(context),
            ImageSource::Image(_) => None,
        }
    }

    /// Pre-built image reference, if this service pulls one.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        match &self.source {
            ImageSource::Image(image) => Some(image),
            ImageSource::Build { .. } => None,
        }
    }

    /// Value of a label.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Literal environment values declared by the manifest.
    pub fn literal_environment(&self) -> impl Iterator<Item = (&str, &str)> {
        self.environment.iter().filter_map(|entry| match entry {
            EnvEntry::Literal { name, value } => Some((name.as_str(), value.as_str())),
            EnvEntry::Inherit(_) => None,
        })
    }
}

/// A loaded manifest: services by name plus the scoped `.env` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    dir: PathBuf,
    services: BTreeMap<String, Service>,
    env_file: BTreeMap<String, String>,
}

impl Manifest {
    pub(crate) const fn new(
        dir: PathBuf,
        services: BTreeMap<String, Service>,
        env_file: BTreeMap<String, String>,
    ) -> Self {
        Self {
            dir,
            services,
            env_file,
        }
    }

    /// Absolute directory the manifest was loaded from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Services in alphabetic order of name.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Service names in alphabetic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns whether the manifest declares no service.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Values read from the `.env` file next to the manifest.
    #[must_use]
    pub const fn env_file(&self) -> &BTreeMap<String, String> {
        &self.env_file
    }

    /// Length of the longest service name.
    #[must_use]
    pub fn longest_name(&self) -> usize {
        self.services.keys().map(String::len).max().unwrap_or(0)
    }
}
