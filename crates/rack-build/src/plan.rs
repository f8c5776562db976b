//! Build planning and execution.
//!
//! Services with a `build` context are grouped by their context resolved
//! through symlinks (plus Dockerfile), so every physical tree is built
//! once under one ephemeral tag. Services with an `image` are pulled.
//! Afterwards every service image is retagged to `app/service` in
//! alphabetic order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rack_common::error::{BuildError, ImagePhase};
use rack_common::types::ImageTag;
use rack_engine::{BuildOptions, ContainerEngine};
use rack_manifest::{ImageSource, Manifest};
use serde::Serialize;

use crate::retry::RetryPolicy;

const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// One physical build shared by one or more services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildGroup {
    /// Build context with symlinks resolved.
    pub context: PathBuf,
    /// Alternate Dockerfile relative to the context.
    pub dockerfile: Option<String>,
    /// Ephemeral tag the group is built under.
    pub tag: ImageTag,
    /// Services using this build, alphabetically.
    pub services: Vec<String>,
}

/// Everything needed to produce the canonical image of every service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    /// Unique builds, ordered by context.
    pub builds: Vec<BuildGroup>,
    /// Pre-built images to pull, sorted and deduplicated.
    pub pulls: Vec<String>,
    /// Canonical `app/service` tag to its source tag.
    pub tags: BTreeMap<ImageTag, String>,
}

/// Switches applied while executing a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Reuse the engine's layer cache.
    pub use_cache: bool,
    /// Retries for pulls.
    pub retry: RetryPolicy,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl BuildPlan {
    /// Plans the builds of `manifest` for `app` with random ephemeral tags.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Context`] if a build context cannot be
    /// resolved on disk.
    pub fn new(manifest: &Manifest, app: &str) -> Result<Self, BuildError> {
        Self::with_tags(manifest, app, crate::tag::ephemeral)
    }

    /// Plans the builds of `manifest`, drawing one tag per unique build
    /// from `next_tag`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Context`] if a build context cannot be
    /// resolved on disk.
    pub fn with_tags(
        manifest: &Manifest,
        app: &str,
        mut next_tag: impl FnMut() -> ImageTag,
    ) -> Result<Self, BuildError> {
        let mut groups: BTreeMap<(PathBuf, String), BuildGroup> = BTreeMap::new();
        let mut pulls = Vec::new();
        let mut tags = BTreeMap::new();

        for service in manifest.services() {
            let canonical = ImageTag::canonical(app, &service.name);
            match &service.source {
                ImageSource::Build {
                    context,
                    dockerfile,
                } => {
                    let resolved =
                        std::fs::canonicalize(context).map_err(|e| BuildError::Context {
                            service: service.name.clone(),
                            path: context.clone(),
                            source: e,
                        })?;
                    let dockerfile = dockerfile
                        .clone()
                        .filter(|d| d != DEFAULT_DOCKERFILE);
                    let key = (
                        resolved.clone(),
                        dockerfile.clone().unwrap_or_else(|| DEFAULT_DOCKERFILE.into()),
                    );

                    let group = groups.entry(key).or_insert_with(|| BuildGroup {
                        context: resolved,
                        dockerfile,
                        tag: next_tag(),
                        services: Vec::new(),
                    });
                    group.services.push(service.name.clone());
                    let _ = tags.insert(canonical, group.tag.to_string());
                }
                ImageSource::Image(image) => {
                    pulls.push(image.clone());
                    let _ = tags.insert(canonical, image.clone());
                }
            }
        }

        pulls.sort();
        pulls.dedup();

        let plan = Self {
            builds: groups.into_values().collect(),
            pulls,
            tags,
        };
        tracing::debug!(
            builds = plan.builds.len(),
            pulls = plan.pulls.len(),
            tags = plan.tags.len(),
            "build plan ready"
        );
        Ok(plan)
    }

    /// Builds every group, pulls every image, then applies the tags in
    /// alphabetic order of the canonical name. Stops at the first error.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Engine`] naming the failing phase and target.
    pub fn execute(
        &self,
        engine: &dyn ContainerEngine,
        options: &ExecuteOptions,
    ) -> Result<(), BuildError> {
        let _ = self.execute_until(engine, options, || false)?;
        Ok(())
    }

    /// Like [`execute`](Self::execute), but checks `stop` before every
    /// engine step and returns `Ok(false)` without further steps once it
    /// returns true. `Ok(true)` means every step ran.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Engine`] naming the failing phase and target.
    pub fn execute_until(
        &self,
        engine: &dyn ContainerEngine,
        options: &ExecuteOptions,
        mut stop: impl FnMut() -> bool,
    ) -> Result<bool, BuildError> {
        for group in &self.builds {
            if stop() {
                tracing::info!("build interrupted");
                return Ok(false);
            }
            tracing::info!(
                context = %group.context.display(),
                tag = %group.tag,
                services = ?group.services,
                "building"
            );
            let build_options = BuildOptions {
                no_cache: !options.use_cache,
                dockerfile: group.dockerfile.clone(),
            };
            engine
                .build(&group.context, &group.tag, &build_options)
                .map_err(|e| engine_error(ImagePhase::Build, group.context.display(), e))?;
        }

        for image in &self.pulls {
            if stop() {
                tracing::info!("pull interrupted");
                return Ok(false);
            }
            tracing::info!(image = %image, "pulling");
            options
                .retry
                .run(image, || engine.pull(image))
                .map_err(|e| engine_error(ImagePhase::Pull, image, e))?;
        }

        for (to, from) in &self.tags {
            if stop() {
                tracing::info!("tagging interrupted");
                return Ok(false);
            }
            engine
                .tag(from, to.as_str())
                .map_err(|e| engine_error(ImagePhase::Tag, to, e))?;
        }

        Ok(true)
    }
}

fn engine_error(
    phase: ImagePhase,
    target: impl std::fmt::Display,
    source: rack_common::error::EngineError,
) -> BuildError {
    BuildError::Engine {
        phase,
        target: target.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rack_engine::fake::RecordingEngine;

    use super::*;

    fn counter() -> impl FnMut() -> ImageTag {
        let mut n = 0;
        move || {
            n += 1;
            ImageTag::new(format!("tag{n}"))
        }
    }

    fn manifest_in(dir: &Path, yaml: &str) -> Manifest {
        rack_manifest::parse_str(dir, yaml).expect("should parse")
    }

    fn quick() -> ExecuteOptions {
        ExecuteOptions {
            use_cache: true,
            retry: RetryPolicy::immediate(2),
        }
    }

    #[test]
    fn shared_context_builds_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(
            dir.path(),
            "a:\n  build: .\nb:\n  build: .\nc:\n  image: convox/redis\n",
        );
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        assert_eq!(plan.builds.len(), 1);
        assert_eq!(plan.builds[0].services, vec!["a", "b"]);
        assert_eq!(plan.pulls, vec!["convox/redis"]);

        let engine = RecordingEngine::new();
        plan.execute(&engine, &quick()).expect("execute");
        assert_eq!(engine.calls_of("build").len(), 1);
        assert_eq!(engine.calls_of("pull"), vec!["pull convox/redis"]);
        assert_eq!(
            engine.calls_of("tag"),
            vec![
                "tag -f tag1 app/a",
                "tag -f tag1 app/b",
                "tag -f convox/redis app/c"
            ]
        );
    }

    #[test]
    fn stop_request_halts_between_steps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(
            dir.path(),
            "a:\n  build: .\nb:\n  image: redis\nc:\n  image: postgres\n",
        );
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        let engine = RecordingEngine::new();

        let mut checks = 0;
        let completed = plan
            .execute_until(&engine, &quick(), || {
                checks += 1;
                checks > 2
            })
            .expect("execute");

        assert!(!completed);
        assert_eq!(engine.calls_of("build").len(), 1);
        assert_eq!(engine.calls_of("pull"), vec!["pull postgres"]);
        assert!(engine.calls_of("tag").is_empty());
    }

    #[test]
    fn uninterrupted_run_completes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(dir.path(), "web:\n  image: x\n");
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        let engine = RecordingEngine::new();
        assert!(plan.execute_until(&engine, &quick(), || false).expect("execute"));
        assert_eq!(engine.calls(), vec!["pull x", "tag -f x app/web"]);
    }

    #[test]
    fn distinct_dockerfiles_build_separately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(
            dir.path(),
            "web:\n  build: .\nworker:\n  build: .\n  dockerfile: Dockerfile.worker\nplain:\n  build: .\n  dockerfile: Dockerfile\n",
        );
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        assert_eq!(plan.builds.len(), 2);

        let engine = RecordingEngine::new();
        plan.execute(&engine, &quick()).expect("execute");
        let builds = engine.calls_of("build");
        assert!(builds.iter().any(|b| b.contains("-f ") && b.contains("Dockerfile.worker")));
        assert!(builds.iter().any(|b| !b.contains("-f ")));
    }

    #[test]
    fn no_cache_forces_fresh_build() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(dir.path(), "web:\n  build: .\n");
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        let engine = RecordingEngine::new();
        let options = ExecuteOptions {
            use_cache: false,
            ..quick()
        };
        plan.execute(&engine, &options).expect("execute");
        assert!(engine.calls_of("build")[0].starts_with("build -t tag1 --pull --no-cache "));
    }

    #[test]
    fn missing_context_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(dir.path(), "web:\n  build: ./missing\n");
        let err = BuildPlan::with_tags(&m, "app", counter()).unwrap_err();
        assert!(matches!(err, BuildError::Context { ref service, .. } if service == "web"));
    }

    #[test]
    fn build_failure_stops_before_pulls_and_tags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(dir.path(), "web:\n  build: .\nredis:\n  image: redis\n");
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        let engine = RecordingEngine::new();
        engine.fail_when("build ");

        let err = plan.execute(&engine, &quick()).unwrap_err();
        assert!(matches!(err, BuildError::Engine { phase: ImagePhase::Build, .. }));
        assert!(engine.calls_of("pull").is_empty());
        assert!(engine.calls_of("tag").is_empty());
    }

    #[test]
    fn pulls_are_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(dir.path(), "redis:\n  image: redis\n");
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        let engine = RecordingEngine::new();
        engine.fail_when("pull redis");

        let err = plan.execute(&engine, &quick()).unwrap_err();
        assert_eq!(engine.calls_of("pull").len(), 2);
        assert!(err.to_string().starts_with("pull of redis failed"), "got: {err}");
    }

    #[test]
    fn duplicate_images_pulled_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(dir.path(), "a:\n  image: redis\nb:\n  image: redis\n");
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        assert_eq!(plan.pulls, vec!["redis"]);
        assert_eq!(plan.tags.len(), 2);
    }

    #[test]
    fn plan_serializes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = manifest_in(dir.path(), "a:\n  image: redis\n");
        let plan = BuildPlan::with_tags(&m, "app", counter()).expect("plan");
        let json = serde_json::to_value(&plan).expect("json");
        assert_eq!(json["tags"]["app/a"], "redis");
    }
}
