//! Effective environment of each service.
//!
//! Literal `NAME=VALUE` entries pass through. A bare `NAME` takes its value
//! from link variables first, then from the process environment, and is
//! reported missing when neither has it.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt;

use crate::model::{EnvEntry, Manifest, Service};

/// Snapshot of the environment a run resolves bare names against.
///
/// Built once per run; the OS environment of this process is never
/// modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: BTreeMap<String, String>,
}

impl ProcessEnv {
    /// Captures the OS environment overlaid with the manifest's `.env`
    /// values.
    #[must_use]
    pub fn capture(manifest: &Manifest) -> Self {
        Self::from_os_pairs(std::env::vars_os()).with_overrides(manifest.env_file())
    }

    /// Builds an environment from OS strings. Entries whose name or value
    /// is not valid UTF-8 are skipped.
    #[must_use]
    pub fn from_os_pairs(pairs: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Self::from_pairs(pairs.into_iter().filter_map(|(name, value)| {
            match (name.into_string(), value.into_string()) {
                (Ok(name), Ok(value)) => Some((name, value)),
                (Ok(name), Err(_)) => {
                    tracing::debug!(name = %name, "skipping environment variable with non UTF-8 value");
                    None
                }
                (Err(name), _) => {
                    tracing::debug!(name = %name.to_string_lossy(), "skipping environment variable with non UTF-8 name");
                    None
                }
            }
        }))
    }

    /// Builds an environment from explicit pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns a copy with `overrides` replacing existing values.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (name, value) in overrides {
            let _ = self.vars.insert(name.clone(), value.clone());
        }
        self
    }

    /// Value of a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// One resolved `NAME=VALUE` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedVar {
    /// Variable name.
    pub name: String,
    /// Resolved value.
    pub value: String,
}

impl fmt::Display for ResolvedVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Outcome of resolving one service's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Variables with values, ready to pass to the engine.
    pub vars: Vec<ResolvedVar>,
    /// Bare names without a value, in declaration order.
    pub missing: Vec<String>,
}

impl Resolution {
    /// Returns whether every referenced variable has a value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Resolves a service's environment against the process environment,
/// keeping declaration order.
#[must_use]
pub fn resolve(service: &Service, env: &ProcessEnv) -> Resolution {
    let mut resolution = Resolution::default();
    for entry in &service.environment {
        match entry {
            EnvEntry::Literal { name, value } => resolution.vars.push(ResolvedVar {
                name: name.clone(),
                value: value.clone(),
            }),
            EnvEntry::Inherit(name) => match env.get(name) {
                Some(value) => resolution.vars.push(ResolvedVar {
                    name: name.clone(),
                    value: value.to_string(),
                }),
                None => resolution.missing.push(name.clone()),
            },
        }
    }
    resolution
}

/// Resolves a service's environment with link variables available.
///
/// Bare names prefer link variables over the process environment. Link
/// variables the service does not name are appended, and the result is
/// sorted by name.
#[must_use]
pub fn resolve_with_links(
    service: &Service,
    env: &ProcessEnv,
    link_vars: &BTreeMap<String, String>,
) -> Resolution {
    let mut unused = link_vars.clone();
    let mut resolution = Resolution::default();

    for entry in &service.environment {
        match entry {
            EnvEntry::Literal { name, value } => resolution.vars.push(ResolvedVar {
                name: name.clone(),
                value: value.clone(),
            }),
            EnvEntry::Inherit(name) => {
                let value = unused
                    .remove(name)
                    .filter(|v| !v.is_empty())
                    .or_else(|| env.get(name).map(ToString::to_string));
                match value {
                    Some(value) => resolution.vars.push(ResolvedVar {
                        name: name.clone(),
                        value,
                    }),
                    None => resolution.missing.push(name.clone()),
                }
            }
        }
    }

    resolution
        .vars
        .extend(unused.into_iter().map(|(name, value)| ResolvedVar { name, value }));
    resolution.vars.sort_by(|a, b| a.name.cmp(&b.name));
    resolution
}

/// Aggregates the missing names of several resolutions into a
/// deduplicated, sorted list.
pub fn missing_environment<'a>(resolutions: impl IntoIterator<Item = &'a Resolution>) -> Vec<String> {
    resolutions
        .into_iter()
        .flat_map(|r| r.missing.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
