//! Manifest loading and normalization.
//!
//! Reads `docker-compose.yml`, merges the optional `.env` file next to it,
//! expands relative paths against the manifest directory, and turns the
//! polymorphic YAML fields into canonical [`model`](crate::model) values.
//!
//! The `.env` values are kept on the returned [`Manifest`] as a scoped map;
//! the OS environment of this process is never modified.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use rack_common::constants::{DEFAULT_MANIFEST_FILE, ENV_FILE};
use rack_common::error::LoadError;

use crate::model::{EnvEntry, ImageSource, Link, Manifest, Service, ServiceCommand};
use crate::raw::{
    RawBuild, RawCommand, RawComposeV2, RawKeyValues, RawProbe, RawService, RawServices, Scalar,
};

/// Loads `docker-compose.yml` from `dir`.
///
/// # Errors
///
/// See [`load_file`].
pub fn load(dir: &Path) -> Result<Manifest, LoadError> {
    load_file(&dir.join(DEFAULT_MANIFEST_FILE))
}

/// Loads a manifest from an explicit file path.
///
/// The manifest directory is the file's parent; relative paths and the
/// `.env` file are resolved against it.
///
/// # Errors
///
/// Returns [`LoadError::MissingManifest`] if the file does not exist,
/// [`LoadError::Syntax`] for malformed YAML, [`LoadError::EnvFile`] for a
/// malformed `.env`, and [`LoadError::Invalid`] for schema violations.
pub fn load_file(path: &Path) -> Result<Manifest, LoadError> {
    let path = std::path::absolute(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let path = lexical_clean(&path);
    let dir = path
        .parent()
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);

    tracing::info!(path = %path.display(), "loading manifest");

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoadError::MissingManifest { path });
        }
        Err(e) => return Err(LoadError::Io { path, source: e }),
    };

    let env_path = dir.join(ENV_FILE);
    let env_file = if env_path.is_file() {
        crate::dotenv::read(&env_path)?
    } else {
        BTreeMap::new()
    };

    build(&dir, &path, &content, env_file)
}

/// Parses manifest text as if it had been read from `dir`, without
/// touching the filesystem. No `.env` file is merged.
///
/// # Errors
///
/// Returns [`LoadError::Syntax`] or [`LoadError::Invalid`].
pub fn parse_str(dir: &Path, content: &str) -> Result<Manifest, LoadError> {
    let dir = lexical_clean(dir);
    let path = dir.join(DEFAULT_MANIFEST_FILE);
    build(&dir, &path, content, BTreeMap::new())
}

fn build(
    dir: &Path,
    path: &Path,
    content: &str,
    env_file: BTreeMap<String, String>,
) -> Result<Manifest, LoadError> {
    let raw = decode(path, content)?;

    let mut services = BTreeMap::new();
    for (name, entry) in raw {
        let service = normalize(dir, &name, entry)?;
        let _ = services.insert(name, service);
    }

    let manifest = Manifest::new(dir.to_path_buf(), services, env_file);
    crate::validator::validate(&manifest)?;
    tracing::debug!(services = manifest.len(), "manifest loaded");
    Ok(manifest)
}

fn decode(path: &Path, content: &str) -> Result<RawServices, LoadError> {
    if content.trim().is_empty() {
        return Ok(RawServices::new());
    }

    let syntax = |e: serde_yaml::Error| LoadError::Syntax {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let probe: RawProbe = serde_yaml::from_str(content).unwrap_or_default();
    if probe.is_v2() {
        let file: RawComposeV2 = serde_yaml::from_str(content).map_err(syntax)?;
        Ok(file.services)
    } else {
        serde_yaml::from_str(content).map_err(syntax)
    }
}

fn normalize(dir: &Path, name: &str, raw: RawService) -> Result<Service, LoadError> {
    let invalid = |detail: String| LoadError::Invalid {
        detail: format!("service {name}: {detail}"),
    };

    let build = raw.build.and_then(|b| match b {
        RawBuild::Path(context) if context.is_empty() => None,
        RawBuild::Path(context) => Some((context, None)),
        RawBuild::Detailed {
            context,
            dockerfile,
        } => Some((context, dockerfile)),
    });
    let image = raw.image.filter(|i| !i.is_empty());

    let source = match (build, image) {
        (Some((context, dockerfile)), None) => ImageSource::Build {
            context: clean_join(dir, &context),
            dockerfile: dockerfile.or(raw.dockerfile).filter(|d| !d.is_empty()),
        },
        (None, Some(image)) => ImageSource::Image(image),
        (Some(_), Some(_)) => return Err(invalid("declares both build and image".into())),
        (None, None) => return Err(invalid("declares neither build nor image".into())),
    };

    let command = match raw.command {
        None => ServiceCommand::None,
        Some(RawCommand::Shell(cmd)) if cmd.trim().is_empty() => ServiceCommand::None,
        Some(RawCommand::Shell(cmd)) => ServiceCommand::Shell(cmd),
        Some(RawCommand::Argv(argv)) if argv.is_empty() => ServiceCommand::None,
        Some(RawCommand::Argv(argv)) => {
            ServiceCommand::Argv(argv.iter().map(ToString::to_string).collect())
        }
    };

    let environment = match raw.environment {
        None => Vec::new(),
        Some(RawKeyValues::Map(map)) => map
            .into_iter()
            .map(|(name, value)| match value {
                Some(value) => EnvEntry::Literal {
                    name,
                    value: value.to_string(),
                },
                None => EnvEntry::Inherit(name),
            })
            .collect(),
        Some(RawKeyValues::List(list)) => list.iter().map(|e| EnvEntry::parse(e)).collect(),
    };

    let labels = match raw.labels {
        None => BTreeMap::new(),
        Some(RawKeyValues::Map(map)) => map
            .into_iter()
            .map(|(k, v)| (k, v.map(|v| v.to_string()).unwrap_or_default()))
            .collect(),
        Some(RawKeyValues::List(list)) => list
            .iter()
            .filter_map(|label| {
                let pair = label.split_once('=');
                if pair.is_none() {
                    tracing::warn!(service = name, label = %label, "ignoring label without value");
                }
                pair.map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect(),
    };

    let ports = raw
        .ports
        .iter()
        .map(|port| match port {
            Scalar::Int(n) if *n >= 0 => Ok(n.to_string()),
            Scalar::Text(s) => Ok(s.trim().to_string()),
            other => Err(invalid(format!("unsupported port declaration {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Service {
        name: name.to_string(),
        source,
        command,
        entrypoint: raw.entrypoint.filter(|e| !e.is_empty()),
        environment,
        links: raw.links.iter().map(|l| Link::parse(l)).collect(),
        ports,
        volumes: raw
            .volumes
            .iter()
            .map(|v| absolutize_volume(dir, v))
            .collect(),
        labels,
        privileged: raw.privileged,
    })
}

/// Rewrites the source and destination of a `src[:dst[:mode]]` volume declaration
/// to absolute paths rooted at `dir`. The mode component is kept verbatim.
#[must_use]
pub fn absolutize_volume(dir: &Path, volume: &str) -> String {
    volume
        .split(':')
        .enumerate()
        .map(|(idx, part)| {
            if idx < 2 && !Path::new(part).is_absolute() {
                clean_join(dir, part).to_string_lossy().into_owned()
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Joins `relative` onto `base` and removes `.` and `..` components
/// lexically, without touching the filesystem.
fn clean_join(base: &Path, relative: &str) -> PathBuf {
    lexical_clean(&base.join(relative))
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
