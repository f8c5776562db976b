//! Publishing service images to a registry.

use rack_common::constants::DEFAULT_PUSH_TAG;
use rack_common::error::{BuildError, ImagePhase};
use rack_common::types::ImageTag;
use rack_engine::{ContainerEngine, Credentials};
use rack_manifest::Manifest;

use crate::retry::RetryPolicy;

/// Where a registry push should land.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Registry host, optionally with a namespace.
    pub registry: String,
    /// Image tag; `latest` when unset.
    pub tag: Option<String>,
    /// Push every service into one repository, distinguishing services by
    /// tag (`<flatten>:service.tag`).
    pub flatten: Option<String>,
}

/// One image to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    /// Service name.
    pub service: String,
    /// Local canonical image.
    pub local: ImageTag,
    /// Remote reference.
    pub remote: String,
}

/// Computes the push targets of every service, alphabetically.
#[must_use]
pub fn targets(manifest: &Manifest, app: &str, options: &PushOptions) -> Vec<PushTarget> {
    let tag = options
        .tag
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_PUSH_TAG);
    let registry = options.registry.trim_end_matches('/');

    manifest
        .names()
        .map(|service| {
            let remote = match options.flatten.as_deref().filter(|f| !f.is_empty()) {
                Some(repo) => format!("{registry}/{repo}:{service}.{tag}"),
                None => format!("{registry}/{app}-{service}:{tag}"),
            };
            PushTarget {
                service: service.to_string(),
                local: ImageTag::canonical(app, service),
                remote,
            }
        })
        .collect()
}

/// Tags and pushes every service image. Stops at the first failure.
///
/// # Errors
///
/// Returns [`BuildError::Engine`] with [`ImagePhase::Push`] naming the
/// remote reference that failed after all retries.
pub fn push(
    engine: &dyn ContainerEngine,
    manifest: &Manifest,
    app: &str,
    options: &PushOptions,
    retry: RetryPolicy,
) -> Result<Vec<PushTarget>, BuildError> {
    let targets = targets(manifest, app, options);
    for target in &targets {
        tracing::info!(service = %target.service, remote = %target.remote, "pushing");
        retry
            .run(&target.remote, || {
                engine.push(target.local.as_str(), &target.remote)
            })
            .map_err(|e| BuildError::Engine {
                phase: ImagePhase::Push,
                target: target.remote.clone(),
                source: e,
            })?;
    }
    Ok(targets)
}

/// Logs in to `registry`.
///
/// # Errors
///
/// Returns [`BuildError::Engine`] with [`ImagePhase::Login`].
pub fn login(
    engine: &dyn ContainerEngine,
    registry: &str,
    credentials: &Credentials,
) -> Result<(), BuildError> {
    tracing::info!(registry, username = %credentials.username, "logging in");
    engine
        .login(registry, credentials)
        .map_err(|e| BuildError::Engine {
            phase: ImagePhase::Login,
            target: registry.to_string(),
            source: e,
        })
}
