//! The `start` lifecycle: preflight checks, images, then supervision.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use rack_build::{BuildPlan, ExecuteOptions, RetryPolicy};
use rack_common::config::RackConfig;
use rack_common::error::{ConfigError, RackError};
use rack_engine::ContainerEngine;
use rack_manifest::env::{self, ProcessEnv};
use rack_manifest::{Manifest, graph, links, ports};

use crate::output::OutputMux;
use crate::probe;
use crate::supervisor::{Supervisor, SupervisorOptions};

/// Options of one `start` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    /// Application name; prefixes container and image names.
    pub app: String,
    /// Build and pull images before starting.
    pub build: bool,
    /// Reuse the engine's layer cache when building.
    pub use_cache: bool,
    /// Host port shift.
    pub shift: i32,
    /// Delay between two launches.
    pub launch_spacing: Duration,
    /// Retries for pulls.
    pub retry: RetryPolicy,
    /// Host whose ports are probed before starting; `None` skips the probe.
    pub probe_host: Option<String>,
}

impl StartOptions {
    /// Options for `app` taken from `config`, probing the current engine
    /// host.
    #[must_use]
    pub fn from_config(app: impl Into<String>, config: &RackConfig) -> Self {
        Self {
            app: app.into(),
            build: true,
            use_cache: true,
            shift: 0,
            launch_spacing: config.launch_spacing(),
            retry: RetryPolicy::from_config(config),
            probe_host: Some(probe::current_engine_host()),
        }
    }
}

/// Checks that need neither images nor containers: port conflicts,
/// missing environment, and a valid start order.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found.
pub fn preflight(manifest: &Manifest, process_env: &ProcessEnv, shift: i32) -> Result<(), ConfigError> {
    ports::check_conflicts(manifest, shift)?;

    let mut resolutions = Vec::with_capacity(manifest.len());
    for service in manifest.services() {
        // Link variable names do not depend on image contents.
        let link_vars = links::link_variables(manifest, "", service, |_| {
            Ok::<_, Infallible>(BTreeMap::new())
        })
        .unwrap_or_default();
        resolutions.push(env::resolve_with_links(service, process_env, &link_vars));
    }
    let missing = env::missing_environment(&resolutions);
    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvironment { names: missing });
    }

    let _ = graph::start_order(manifest)?;
    Ok(())
}

/// Builds, pulls, and retags every service image.
///
/// # Errors
///
/// Returns the first build or engine failure.
pub fn build(
    engine: &dyn ContainerEngine,
    manifest: &Manifest,
    app: &str,
    options: &ExecuteOptions,
) -> Result<BuildPlan, RackError> {
    let plan = BuildPlan::new(manifest, app)?;
    tracing::info!(
        app,
        builds = plan.builds.len(),
        pulls = plan.pulls.len(),
        "building images"
    );
    plan.execute(engine, options)?;
    Ok(plan)
}

/// Runs the whole `start` lifecycle and returns the aggregated errors.
///
/// Any failure before the first launch is returned alone.
pub fn start(
    engine: &dyn ContainerEngine,
    manifest: &Manifest,
    options: &StartOptions,
    process_env: &ProcessEnv,
    output: OutputMux,
    interrupts: Receiver<()>,
) -> Vec<RackError> {
    if let Err(e) = prepare(engine, manifest, options, process_env, &interrupts) {
        return vec![e];
    }

    let supervisor = Supervisor::new(
        engine,
        options.app.clone(),
        SupervisorOptions {
            shift: options.shift,
            launch_spacing: options.launch_spacing,
        },
        output,
    );
    supervisor.run(manifest, process_env, interrupts)
}

fn prepare(
    engine: &dyn ContainerEngine,
    manifest: &Manifest,
    options: &StartOptions,
    process_env: &ProcessEnv,
    interrupts: &Receiver<()>,
) -> Result<(), RackError> {
    preflight(manifest, process_env, options.shift)?;

    if let Some(host) = &options.probe_host {
        let wanted = ports::wanted_host_ports(manifest, options.shift)?;
        probe::check_ports_free(host, &wanted)?;
    }

    if options.build {
        let plan = BuildPlan::new(manifest, &options.app)?;
        tracing::info!(
            app = %options.app,
            builds = plan.builds.len(),
            pulls = plan.pulls.len(),
            "building images"
        );
        let execute = ExecuteOptions {
            use_cache: options.use_cache,
            retry: options.retry,
        };
        if !plan.execute_until(engine, &execute, || interrupts.try_recv().is_ok())? {
            return Err(RackError::Interrupted);
        }
    } else if interrupts.try_recv().is_ok() {
        return Err(RackError::Interrupted);
    }
    Ok(())
}

/// Default application name of a manifest directory: its base name,
/// lower-cased, with characters outside `[a-z0-9-]` replaced by `-`.
#[must_use]
pub fn app_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use rack_engine::fake::RecordingEngine;

    use super::*;

    fn options() -> StartOptions {
        StartOptions {
            app: "app".into(),
            build: true,
            use_cache: true,
            shift: 0,
            launch_spacing: Duration::from_millis(1),
            retry: RetryPolicy::once(),
            probe_host: None,
        }
    }

    fn manifest(yaml: &str) -> Manifest {
        rack_manifest::parse_str(Path::new("/app"), yaml).expect("should parse")
    }

    #[test]
    fn app_name_is_sanitized() {
        assert_eq!(app_name(Path::new("/src/My_App.v2")), "my-app-v2");
        assert_eq!(app_name(Path::new("/src/shop-api")), "shop-api");
    }

    #[test]
    fn missing_environment_fails_before_build() {
        let engine = RecordingEngine::new();
        let (_tx, rx) = mpsc::channel();
        let errors = start(
            &engine,
            &manifest("web:\n  image: x\n  environment: [FOO, BAR]\n"),
            &options(),
            &ProcessEnv::default(),
            OutputMux::new(std::io::sink(), 3, false),
            rx,
        );
        match &errors[..] {
            [RackError::Config(ConfigError::MissingEnvironment { names })] => {
                assert_eq!(names, &["BAR", "FOO"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn link_variable_names_satisfy_preflight() {
        let m = manifest(
            "web:\n  image: x\n  links: [db]\n  environment: [DB_URL]\ndb:\n  image: pg\n  ports: [5432]\n",
        );
        preflight(&m, &ProcessEnv::default(), 0).expect("preflight");
    }

    #[test]
    fn pull_failure_aborts_before_launch() {
        let engine = RecordingEngine::new();
        engine.fail_when("pull");
        let (_tx, rx) = mpsc::channel();
        let errors = start(
            &engine,
            &manifest("web:\n  image: x\n"),
            &options(),
            &ProcessEnv::default(),
            OutputMux::new(std::io::sink(), 3, false),
            rx,
        );
        assert!(matches!(errors[..], [RackError::Build(_)]));
        assert!(engine.calls_of("run").is_empty());
    }

    #[test]
    fn images_are_ready_before_first_run() {
        let engine = RecordingEngine::new();
        let (_tx, rx) = mpsc::channel();
        let errors = start(
            &engine,
            &manifest("web:\n  image: x\n"),
            &options(),
            &ProcessEnv::default(),
            OutputMux::new(std::io::sink(), 3, false),
            rx,
        );
        assert!(errors.is_empty(), "{errors:?}");
        let calls = engine.calls();
        let tag = calls.iter().position(|c| c == "tag -f x app/web").expect("tag");
        let run = calls.iter().position(|c| c.starts_with("run ")).expect("run");
        assert!(tag < run);
    }

    #[test]
    fn interrupt_during_build_skips_remaining_steps() {
        let engine = RecordingEngine::new();
        let (tx, rx) = mpsc::channel();
        tx.send(()).expect("signal");
        let errors = start(
            &engine,
            &manifest("web:\n  image: x\nworker:\n  image: y\n"),
            &options(),
            &ProcessEnv::default(),
            OutputMux::new(std::io::sink(), 6, false),
            rx,
        );
        assert!(matches!(errors[..], [RackError::Interrupted]), "{errors:?}");
        assert!(engine.calls_of("pull").is_empty());
        assert!(engine.calls_of("tag").is_empty());
        assert!(engine.calls_of("run").is_empty());
    }

    #[test]
    fn interrupt_without_build_starts_nothing() {
        let engine = RecordingEngine::new();
        let (tx, rx) = mpsc::channel();
        tx.send(()).expect("signal");
        let errors = start(
            &engine,
            &manifest("web:\n  image: x\n"),
            &StartOptions {
                build: false,
                ..options()
            },
            &ProcessEnv::default(),
            OutputMux::new(std::io::sink(), 3, false),
            rx,
        );
        assert!(matches!(errors[..], [RackError::Interrupted]), "{errors:?}");
        assert!(engine.calls().is_empty());
    }
}
