//! Supervisor: owns the containers of one run.
//!
//! Startup checks host port conflicts and missing environment, computes
//! the start order, and launches each service with a spacing delay. Each
//! launched container is streamed by its own thread, which reports one
//! result over a channel. A listener thread waits for an interrupt; on the
//! first one it stops further launches and kills every launched container
//! in reverse start order.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rack_common::constants::DEFAULT_LAUNCH_SPACING_MS;
use rack_common::error::{ConfigError, RackError, RuntimeError};
use rack_common::types::{ContainerName, ImageTag};
use rack_engine::{ContainerEngine, ProcessHandle, command};
use rack_manifest::env::{self, ProcessEnv, ResolvedVar};
use rack_manifest::{Manifest, graph, links, ports};

use crate::args::run_args;
use crate::driver;
use crate::output::OutputMux;

/// How often the listener and the spacing delay check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tunables of a supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Host port shift applied to services without a shift label.
    pub shift: i32,
    /// Delay between two launches.
    pub launch_spacing: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            shift: 0,
            launch_spacing: Duration::from_millis(DEFAULT_LAUNCH_SPACING_MS),
        }
    }
}

/// What a service thread or the listener reports.
enum Outcome {
    Service {
        name: String,
        result: Result<(), RuntimeError>,
        /// Teardown had begun when the container exited.
        after_stop: bool,
    },
    Interrupted,
}

#[derive(Debug, Default)]
struct LaunchState {
    stopping: bool,
    launched: Vec<ContainerName>,
}

/// A service ready to launch.
struct Launch {
    name: String,
    container: ContainerName,
    args: Vec<String>,
}

/// Runs the services of one app until they end or an interrupt arrives.
pub struct Supervisor<'a> {
    engine: &'a dyn ContainerEngine,
    app: String,
    options: SupervisorOptions,
    output: OutputMux,
}

impl std::fmt::Debug for Supervisor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("app", &self.app)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Supervisor<'a> {
    /// Creates a supervisor for `app`.
    pub fn new(
        engine: &'a dyn ContainerEngine,
        app: impl Into<String>,
        options: SupervisorOptions,
        output: OutputMux,
    ) -> Self {
        Self {
            engine,
            app: app.into(),
            options,
            output,
        }
    }

    /// Starts every service and blocks until all launched services have
    /// ended. Returns the aggregated errors; an empty list is a clean run.
    ///
    /// Pre-start failures (port conflicts, missing environment, cycles)
    /// return a single error before any container is touched. After an
    /// interrupt, the list contains [`RackError::Interrupted`] and exits
    /// caused by the teardown are not reported.
    pub fn run(
        &self,
        manifest: &Manifest,
        process_env: &ProcessEnv,
        interrupts: Receiver<()>,
    ) -> Vec<RackError> {
        let launches = match self.prepare(manifest, process_env) {
            Ok(launches) => launches,
            Err(e) => return vec![e],
        };
        self.launch_all(launches, interrupts)
    }

    /// Runs the pre-start checks and renders every invocation.
    fn prepare(
        &self,
        manifest: &Manifest,
        process_env: &ProcessEnv,
    ) -> Result<Vec<Result<Launch, RuntimeError>>, RackError> {
        ports::check_conflicts(manifest, self.options.shift)?;

        let mut resolved: BTreeMap<&str, Vec<ResolvedVar>> = BTreeMap::new();
        let mut resolutions = Vec::with_capacity(manifest.len());
        for service in manifest.services() {
            let link_vars = links::link_variables(manifest, &self.app, service, |target| {
                self.engine
                    .inspect_image(ImageTag::canonical(&self.app, &target.name).as_str())
            })?;
            let resolution = env::resolve_with_links(service, process_env, &link_vars);
            let _ = resolved.insert(&service.name, resolution.vars.clone());
            resolutions.push(resolution);
        }
        let missing = env::missing_environment(&resolutions);
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvironment { names: missing }.into());
        }

        let order = graph::start_order(manifest)?;

        let mut seen = HashSet::new();
        let mut launches = Vec::with_capacity(order.len());
        for name in order {
            let container = ContainerName::for_service(&self.app, &name);
            if !seen.insert(container.clone()) {
                return Err(RackError::Internal {
                    message: format!("duplicate container name {container}"),
                });
            }
            let Some(service) = manifest.service(&name) else {
                return Err(RackError::Internal {
                    message: format!("ordered service {name} is not in the manifest"),
                });
            };
            let shift = ports::service_shift(service, self.options.shift)?;
            let env = resolved.get(name.as_str()).map_or(&[][..], Vec::as_slice);
            launches.push(run_args(&self.app, service, env, shift).map(|args| Launch {
                name,
                container,
                args,
            }));
        }
        Ok(launches)
    }

    fn launch_all(
        &self,
        launches: Vec<Result<Launch, RuntimeError>>,
        interrupts: Receiver<()>,
    ) -> Vec<RackError> {
        let state = Mutex::new(LaunchState::default());
        let finished = AtomicBool::new(false);
        let (results_tx, results_rx) = mpsc::channel::<Outcome>();
        let mut errors: Vec<RackError> = Vec::new();

        thread::scope(|scope| {
            let listener_tx = results_tx.clone();
            let (state, finished) = (&state, &finished);
            let listener =
                scope.spawn(move || self.listen(&interrupts, state, finished, listener_tx));

            let total = launches.len();
            let mut expected = 0usize;
            for (index, launch) in launches.into_iter().enumerate() {
                let launch = match launch {
                    Ok(launch) => launch,
                    Err(e) => {
                        tracing::error!(error = %e, "service not launched");
                        errors.push(e.into());
                        continue;
                    }
                };

                let prefix = self.output.prefix(&launch.name, index);
                let handle: Box<dyn ProcessHandle> = {
                    let mut st = lock(state);
                    if st.stopping {
                        break;
                    }
                    let _ = prefix.line(&command::render(&command::run(&launch.args)));
                    st.launched.push(launch.container.clone());
                    match driver::start(self.engine, &launch.name, &launch.container, &launch.args) {
                        Ok(handle) => handle,
                        Err(e) => {
                            tracing::error!(service = %launch.name, error = %e, "launch failed");
                            errors.push(e.into());
                            continue;
                        }
                    }
                };
                tracing::info!(service = %launch.name, container = %launch.container, "launched");

                expected += 1;
                let tx = results_tx.clone();
                let _ = scope.spawn(move || {
                    let result = driver::supervise(handle, &prefix, &launch.name);
                    let after_stop = lock(state).stopping;
                    let _ = tx.send(Outcome::Service {
                        name: launch.name,
                        result,
                        after_stop,
                    });
                });

                if index + 1 < total {
                    self.pause(state);
                }
            }
            drop(results_tx);

            let mut interrupted = false;
            let mut received = 0usize;
            while received < expected {
                match results_rx.recv() {
                    Ok(Outcome::Service {
                        name,
                        result,
                        after_stop,
                    }) => {
                        received += 1;
                        match result {
                            Ok(()) => tracing::info!(service = %name, "service completed"),
                            Err(RuntimeError::Exited { .. }) if after_stop => {
                                tracing::debug!(service = %name, "service stopped by teardown");
                            }
                            Err(e) => {
                                tracing::warn!(service = %name, error = %e, "service failed");
                                errors.push(e.into());
                            }
                        }
                    }
                    Ok(Outcome::Interrupted) => {
                        interrupted = true;
                        errors.push(RackError::Interrupted);
                    }
                    Err(_) => break,
                }
            }

            finished.store(true, Ordering::SeqCst);
            if listener.join().is_err() {
                tracing::error!("signal listener panicked");
            }
            if !interrupted && matches!(results_rx.try_recv(), Ok(Outcome::Interrupted)) {
                errors.push(RackError::Interrupted);
            }
        });

        errors
    }

    /// Sleeps the launch spacing, returning early once stopping.
    fn pause(&self, state: &Mutex<LaunchState>) {
        let deadline = Instant::now() + self.options.launch_spacing;
        loop {
            let now = Instant::now();
            if now >= deadline || lock(state).stopping {
                return;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Waits for the first interrupt and tears down in reverse start order.
    fn listen(
        &self,
        interrupts: &Receiver<()>,
        state: &Mutex<LaunchState>,
        finished: &AtomicBool,
        results: Sender<Outcome>,
    ) {
        loop {
            if finished.load(Ordering::SeqCst) {
                return;
            }
            match interrupts.recv_timeout(POLL_INTERVAL) {
                Ok(()) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        let launched = {
            let mut st = lock(state);
            st.stopping = true;
            st.launched.clone()
        };

        tracing::info!(containers = launched.len(), "interrupt received, stopping");
        let _ = self.output.system().line("stopping");
        let _ = results.send(Outcome::Interrupted);

        for container in launched.iter().rev() {
            tracing::info!(container = %container, "killing");
            if let Err(e) = self.engine.kill(container) {
                tracing::warn!(container = %container, error = %e, "kill failed");
            }
        }
    }
}

fn lock(state: &Mutex<LaunchState>) -> MutexGuard<'_, LaunchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rack_engine::fake::{ContainerScript, RecordingEngine};

    use super::*;

    fn manifest(yaml: &str) -> Manifest {
        rack_manifest::parse_str(Path::new("/app"), yaml).expect("should parse")
    }

    fn quick() -> SupervisorOptions {
        SupervisorOptions {
            shift: 0,
            launch_spacing: Duration::from_millis(5),
        }
    }

    fn sink() -> OutputMux {
        OutputMux::new(std::io::sink(), 8, false)
    }

    #[test]
    fn clean_run_returns_no_errors() {
        let engine = RecordingEngine::new();
        let (_tx, rx) = mpsc::channel();
        let supervisor = Supervisor::new(&engine, "app", quick(), sink());
        let errors = supervisor.run(
            &manifest("web:\n  image: x\n  links: [db]\ndb:\n  image: y\n"),
            &ProcessEnv::default(),
            rx,
        );
        assert!(errors.is_empty(), "{errors:?}");
        let runs = engine.calls_of("run");
        assert!(runs[0].contains("--name app-db"));
        assert!(runs[1].contains("--name app-web"));
    }

    #[test]
    fn failing_service_does_not_stop_peers() {
        let engine = RecordingEngine::new();
        engine.script("app-a", ContainerScript::exit(2));
        let (_tx, rx) = mpsc::channel();
        let supervisor = Supervisor::new(&engine, "app", quick(), sink());
        let errors = supervisor.run(
            &manifest("a:\n  image: x\nb:\n  image: y\n"),
            &ProcessEnv::default(),
            rx,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], RackError::Runtime(RuntimeError::Exited { .. })));
        assert_eq!(engine.calls_of("run").len(), 2);
    }

    #[test]
    fn invalid_port_is_collected_and_others_run() {
        let engine = RecordingEngine::new();
        let (_tx, rx) = mpsc::channel();
        let supervisor = Supervisor::new(&engine, "app", quick(), sink());
        let errors = supervisor.run(
            &manifest("a:\n  image: x\n  ports: [\"80/tcp\"]\nb:\n  image: y\n"),
            &ProcessEnv::default(),
            rx,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], RackError::Runtime(RuntimeError::InvalidPort { .. })));
        assert_eq!(engine.calls_of("run").len(), 1);
    }

    #[test]
    fn port_conflict_fails_before_any_engine_call() {
        let engine = RecordingEngine::new();
        let (_tx, rx) = mpsc::channel();
        let supervisor = Supervisor::new(&engine, "app", quick(), sink());
        let errors = supervisor.run(
            &manifest("a:\n  image: x\n  ports: [\"80:80\"]\nb:\n  image: y\n  ports: [\"80:8080\"]\n"),
            &ProcessEnv::default(),
            rx,
        );
        assert!(matches!(errors[..], [RackError::Config(ConfigError::PortConflict { port: 80, .. })]));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn link_variables_reach_the_dependent() {
        let engine = RecordingEngine::new();
        engine.set_image_env(
            "app/redis",
            BTreeMap::from([("LINK_SCHEME".to_string(), "redis".to_string())]),
        );
        let (_tx, rx) = mpsc::channel();
        let supervisor = Supervisor::new(&engine, "app", quick(), sink());
        let errors = supervisor.run(
            &manifest("web:\n  image: x\n  links: [redis]\n  environment: [REDIS_URL]\nredis:\n  image: redis\n  ports: [6379]\n"),
            &ProcessEnv::default(),
            rx,
        );
        assert!(errors.is_empty(), "{errors:?}");
        let web_run = engine
            .calls_of("run")
            .into_iter()
            .find(|r| r.contains("--name app-web"))
            .expect("web run");
        assert!(web_run.contains("-e REDIS_URL=redis://app-redis:6379"), "{web_run}");
        assert!(web_run.contains("--link app-redis:redis"));
    }

    #[test]
    fn cycle_is_reported() {
        let engine = RecordingEngine::new();
        let (_tx, rx) = mpsc::channel();
        let supervisor = Supervisor::new(&engine, "app", quick(), sink());
        let errors = supervisor.run(
            &manifest("a:\n  image: x\n  links: [b]\nb:\n  image: y\n  links: [a]\n"),
            &ProcessEnv::default(),
            rx,
        );
        assert!(matches!(errors[..], [RackError::Config(ConfigError::Cycle { .. })]));
        assert!(engine.calls_of("run").is_empty());
    }
}
